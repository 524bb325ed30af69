use crate::domain::model::{ShapeSpec, ValueType};
use crate::utils::error::Result;
use serde_json::Value;
use std::fmt;

/// 被適配的底層資料來源：物件、key/value map，或另一個 adapter
pub trait BackingSource: Send + Sync {
    /// 來源種類標籤，作為結構簽章的一部分
    fn kind(&self) -> String;
    fn get(&self, name: &str) -> Option<Value>;
    fn set(&self, name: &str, value: Value) -> Result<()>;
    /// 已知的 key，依來源宣告的順序
    fn keys(&self) -> Vec<String>;

    /// 讀出目前的值、套用 `apply`、寫回結果
    ///
    /// 預設實作分成 get 與 set 兩步；有鎖的來源應覆寫成單一原子操作。
    fn update(
        &self,
        name: &str,
        apply: &mut dyn FnMut(Option<Value>) -> Result<Value>,
    ) -> Result<()> {
        let value = apply(self.get(name))?;
        self.set(name, value)
    }

    fn has(&self, name: &str) -> bool {
        self.keys().iter().any(|k| k == name)
    }

    /// 結構簽章：只取決於 key 與其值的型別，不取決於值本身
    fn signature(&self) -> SourceSignature {
        let fields = self
            .keys()
            .into_iter()
            .map(|key| {
                let value_type = self
                    .get(&key)
                    .map(|v| ValueType::of(&v))
                    .unwrap_or(ValueType::Null);
                (key, value_type)
            })
            .collect();

        SourceSignature {
            kind: self.kind(),
            fields,
        }
    }

    fn entries(&self) -> Vec<(String, Value)> {
        self.keys()
            .into_iter()
            .filter_map(|key| self.get(&key).map(|value| (key, value)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceSignature {
    pub kind: String,
    pub fields: Vec<(String, ValueType)>,
}

impl SourceSignature {
    pub fn field_type(&self, key: &str) -> Option<ValueType> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, t)| *t)
    }
}

impl fmt::Display for SourceSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|(k, t)| format!("{}:{}", k, t))
            .collect();
        write!(f, "{}{{{}}}", self.kind, fields.join(","))
    }
}

/// 兩個語意型別之間的轉換能力
///
/// `convert` 同時處理兩個方向：讀取時 `from` 是後端型別，寫回時則反過來。
/// 回傳 `None` 代表這個值無法轉換（例如字串解析失敗）。
pub trait Converter: Send + Sync {
    fn name(&self) -> &str;

    /// 宣告的型別對，用於精確比對
    fn pair(&self) -> (ValueType, ValueType);

    fn can_convert(&self, from: ValueType, to: ValueType) -> bool {
        let (a, b) = self.pair();
        (from == a && to == b) || (from == b && to == a)
    }

    fn convert(&self, value: &Value, from: ValueType, to: ValueType) -> Option<Value>;
}

/// 由宿主型別描述自己的 shape
pub trait ShapeProvider {
    fn shape_spec() -> ShapeSpec;
}
