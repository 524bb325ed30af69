use crate::domain::model::ValueType;
use crate::domain::ports::Converter;
use chrono::DateTime;
use serde_json::{Number, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 解析出的轉換：在兩個方向上套用同一個 converter
#[derive(Clone)]
pub struct Conversion {
    converter: Arc<dyn Converter>,
    from: ValueType,
    to: ValueType,
}

impl Conversion {
    pub fn converter_name(&self) -> &str {
        self.converter.name()
    }

    pub fn from_type(&self) -> ValueType {
        self.from
    }

    pub fn to_type(&self) -> ValueType {
        self.to
    }

    /// 後端型別 -> 成員型別；無法轉換時回傳 None
    pub fn try_forward(&self, value: &Value) -> Option<Value> {
        self.converter.convert(value, self.from, self.to)
    }

    /// 成員型別 -> 後端型別；寫入時沒有預設值可退，失敗由呼叫者回報
    pub fn try_backward(&self, value: &Value) -> Option<Value> {
        self.converter.convert(value, self.to, self.from)
    }

    /// 讀取時的寬鬆行為：轉換失敗時回傳目標型別的預設值
    pub fn forward(&self, value: &Value) -> Value {
        self.try_forward(value).unwrap_or_else(|| {
            tracing::debug!(
                "Converter '{}' could not convert {} to {}, using default",
                self.converter.name(),
                value,
                self.to
            );
            self.to.default_value()
        })
    }
}

impl fmt::Debug for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conversion")
            .field("converter", &self.converter.name())
            .field("from", &self.from)
            .field("to", &self.to)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum Resolution {
    /// 型別一致，不需要轉換
    Identity,
    Convert(Conversion),
}

/// 型別對轉換能力的註冊表
///
/// 查找順序：型別相同 → 精確型別對（後註冊者優先）→ 依註冊順序的
/// `can_convert` → 內建後備轉換器。
pub struct ConverterRegistry {
    converters: Vec<Arc<dyn Converter>>,
    exact: HashMap<(ValueType, ValueType), usize>,
    fallbacks: Vec<Arc<dyn Converter>>,
}

impl ConverterRegistry {
    /// 沒有任何轉換器（連內建後備也沒有）
    pub fn empty() -> Self {
        Self {
            converters: Vec::new(),
            exact: HashMap::new(),
            fallbacks: Vec::new(),
        }
    }

    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.fallbacks.push(Arc::new(NumericConverter));
        registry.fallbacks.push(Arc::new(GenericStringConverter));
        registry
    }

    pub fn register(&mut self, converter: Arc<dyn Converter>) -> &mut Self {
        let pair = converter.pair();
        tracing::debug!(
            "Registering converter '{}' for {} -> {}",
            converter.name(),
            pair.0,
            pair.1
        );
        self.converters.push(converter);
        self.exact.insert(pair, self.converters.len() - 1);
        self
    }

    pub fn with(mut self, converter: impl Converter + 'static) -> Self {
        self.register(Arc::new(converter));
        self
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    pub fn resolve(&self, from: ValueType, to: ValueType) -> Option<Resolution> {
        if from == to || to == ValueType::Any || from == ValueType::Null {
            return Some(Resolution::Identity);
        }

        let converter = self
            .exact
            .get(&(from, to))
            .map(|idx| &self.converters[*idx])
            .or_else(|| self.converters.iter().find(|c| c.can_convert(from, to)))
            .or_else(|| self.fallbacks.iter().find(|c| c.can_convert(from, to)))?;

        Some(Resolution::Convert(Conversion {
            converter: Arc::clone(converter),
            from,
            to,
        }))
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.converters.iter().map(|c| c.name()).collect();
        f.debug_struct("ConverterRegistry")
            .field("converters", &names)
            .field("fallbacks", &self.fallbacks.len())
            .finish()
    }
}

/// 任何有標準字串表示的型別 <-> 字串
///
/// 解析失敗時回傳 None，由 `Conversion::forward` 決定是否退回預設值。
pub struct GenericStringConverter;

impl GenericStringConverter {
    fn format(value: &Value, from: ValueType) -> Option<Value> {
        let text = match (from, value) {
            (ValueType::DateTime, Value::String(s)) => {
                DateTime::parse_from_rfc3339(s.trim()).ok()?.to_rfc3339()
            }
            // 寫入的字串必須能被解析成宣告的型別
            (_, Value::String(s)) => {
                Self::parse(s, from)?;
                s.trim().to_string()
            }
            (ValueType::Boolean, Value::Bool(b)) => b.to_string(),
            (ValueType::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => n.to_string(),
            (ValueType::Float, Value::Number(n)) => n.to_string(),
            _ => return None,
        };
        Some(Value::String(text))
    }

    fn parse(text: &str, to: ValueType) -> Option<Value> {
        let text = text.trim();
        match to {
            ValueType::Boolean => match text.to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            ValueType::Integer => text.parse::<i64>().ok().map(Value::from),
            ValueType::Float => text
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),
            ValueType::DateTime => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| Value::String(dt.to_rfc3339())),
            _ => None,
        }
    }
}

impl Converter for GenericStringConverter {
    fn name(&self) -> &str {
        "generic-string"
    }

    fn pair(&self) -> (ValueType, ValueType) {
        (ValueType::Any, ValueType::String)
    }

    fn can_convert(&self, from: ValueType, to: ValueType) -> bool {
        (from.has_canonical_string_form() && to == ValueType::String)
            || (from == ValueType::String && to.has_canonical_string_form())
    }

    fn convert(&self, value: &Value, from: ValueType, to: ValueType) -> Option<Value> {
        if to == ValueType::String {
            return Self::format(value, from);
        }
        match value {
            Value::String(s) => Self::parse(s, to),
            // 值已經是目標型別（例如寫入時傳入數字）
            other if ValueType::of(other) == to => Some(other.clone()),
            _ => None,
        }
    }
}

/// Integer <-> Float
pub struct NumericConverter;

impl Converter for NumericConverter {
    fn name(&self) -> &str {
        "numeric"
    }

    fn pair(&self) -> (ValueType, ValueType) {
        (ValueType::Integer, ValueType::Float)
    }

    fn convert(&self, value: &Value, _from: ValueType, to: ValueType) -> Option<Value> {
        match to {
            ValueType::Float => value
                .as_f64()
                .and_then(Number::from_f64)
                .map(Value::Number),
            ValueType::Integer => {
                if let Some(i) = value.as_i64() {
                    return Some(Value::from(i));
                }
                let f = value.as_f64()?.trunc();
                if f.is_finite() && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                    Some(Value::from(f as i64))
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}
