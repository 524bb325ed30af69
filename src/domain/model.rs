use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// DateTime 成員的預設值（Unix epoch）
pub const EPOCH_RFC3339: &str = "1970-01-01T00:00:00+00:00";

/// 成員或後端欄位的語意型別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Any,
    Null,
    Boolean,
    Integer,
    Float,
    String,
    #[serde(rename = "datetime")]
    DateTime,
    Array,
    Object,
}

impl ValueType {
    /// 依執行期的值判斷型別（DateTime 只能由 shape 宣告，值本身是字串）
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Boolean,
            Value::Number(n) if n.is_i64() || n.is_u64() => ValueType::Integer,
            Value::Number(_) => ValueType::Float,
            Value::String(_) => ValueType::String,
            Value::Array(_) => ValueType::Array,
            Value::Object(_) => ValueType::Object,
        }
    }

    /// 該型別的零值 / 預設值
    pub fn default_value(&self) -> Value {
        match self {
            ValueType::Any | ValueType::Null => Value::Null,
            ValueType::Boolean => Value::Bool(false),
            ValueType::Integer => Value::from(0i64),
            ValueType::Float => Value::from(0.0f64),
            ValueType::String => Value::String(String::new()),
            ValueType::DateTime => Value::String(EPOCH_RFC3339.to_string()),
            ValueType::Array => Value::Array(Vec::new()),
            ValueType::Object => Value::Object(serde_json::Map::new()),
        }
    }

    /// 有標準字串表示（可被通用字串轉換器處理）的型別
    pub fn has_canonical_string_form(&self) -> bool {
        matches!(
            self,
            ValueType::Boolean | ValueType::Integer | ValueType::Float | ValueType::DateTime
        )
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Any => "any",
            ValueType::Null => "null",
            ValueType::Boolean => "boolean",
            ValueType::Integer => "integer",
            ValueType::Float => "float",
            ValueType::String => "string",
            ValueType::DateTime => "datetime",
            ValueType::Array => "array",
            ValueType::Object => "object",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    ReadOnly,
    #[default]
    ReadWrite,
}

/// Shape 規格中成員的種類；Method 可以被宣告，但無法被適配
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberKind {
    #[default]
    Property,
    Nested,
    Collection,
    Method,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberSpec {
    pub name: String,
    #[serde(default)]
    pub kind: MemberKind,
    #[serde(default = "default_member_type", rename = "type")]
    pub value_type: ValueType,
    #[serde(default)]
    pub access: Access,
    /// Nested / Collection 成員的內層 shape
    #[serde(default)]
    pub shape: Option<Box<ShapeSpec>>,
}

fn default_member_type() -> ValueType {
    ValueType::Any
}

/// 由宿主提供的目標 shape 結構描述
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShapeSpec {
    pub name: String,
    #[serde(default)]
    pub members: Vec<MemberSpec>,
}

impl ShapeSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    pub fn member(mut self, member: MemberSpec) -> Self {
        self.members.push(member);
        self
    }

    pub fn read_write(self, name: &str, value_type: ValueType) -> Self {
        self.member(MemberSpec::property(name, value_type, Access::ReadWrite))
    }

    pub fn read_only(self, name: &str, value_type: ValueType) -> Self {
        self.member(MemberSpec::property(name, value_type, Access::ReadOnly))
    }

    pub fn nested(self, name: &str, shape: ShapeSpec) -> Self {
        self.member(MemberSpec {
            name: name.to_string(),
            kind: MemberKind::Nested,
            value_type: ValueType::Object,
            access: Access::ReadWrite,
            shape: Some(Box::new(shape)),
        })
    }

    pub fn collection(self, name: &str, shape: ShapeSpec) -> Self {
        self.member(MemberSpec {
            name: name.to_string(),
            kind: MemberKind::Collection,
            value_type: ValueType::Array,
            access: Access::ReadOnly,
            shape: Some(Box::new(shape)),
        })
    }

    pub fn method(self, name: &str) -> Self {
        self.member(MemberSpec {
            name: name.to_string(),
            kind: MemberKind::Method,
            value_type: ValueType::Any,
            access: Access::ReadOnly,
            shape: None,
        })
    }
}

impl MemberSpec {
    pub fn property(name: &str, value_type: ValueType, access: Access) -> Self {
        Self {
            name: name.to_string(),
            kind: MemberKind::Property,
            value_type,
            access,
            shape: None,
        }
    }
}

/// 每次 adapt 呼叫的選項
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptOptions {
    pub write_through: bool,
    pub strict_conversion: bool,
    pub allow_unmatched_members: bool,
}

impl Default for AdaptOptions {
    fn default() -> Self {
        Self {
            write_through: true,
            strict_conversion: false,
            allow_unmatched_members: false,
        }
    }
}

impl AdaptOptions {
    pub fn snapshot(mut self) -> Self {
        self.write_through = false;
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict_conversion = true;
        self
    }

    pub fn lenient(mut self) -> Self {
        self.allow_unmatched_members = true;
        self
    }
}
