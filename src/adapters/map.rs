use crate::domain::ports::BackingSource;
use crate::utils::error::{AdaptError, Result};
use serde_json::{Map, Value};
use std::sync::{PoisonError, RwLock};

/// 執行緒安全的 key/value 來源，保留 key 的宣告順序
///
/// `sealed` 的 map 行為像一般物件：只能寫入已存在的 key。
#[derive(Debug)]
pub struct MapSource {
    kind: String,
    data: RwLock<Map<String, Value>>,
    sealed: bool,
}

impl MapSource {
    pub fn new() -> Self {
        Self::from_map(Map::new())
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self {
            kind: "map".to_string(),
            data: RwLock::new(map),
            sealed: false,
        }
    }

    /// 只接受 JSON 物件
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self::from_map(map).with_kind("object")),
            other => Err(AdaptError::SerializationError(format!(
                "expected a JSON object, got {}",
                crate::domain::model::ValueType::of(&other)
            ))),
        }
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(content)?;
        Self::from_value(value)
    }

    /// 由字串對建立（例如 INI 或命令列參數解析後的結果）
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), Value::String(v.into())))
            .collect();
        Self::from_map(map)
    }

    /// 複製另一個來源目前所有的 key/value，沿用它的種類標籤
    pub fn snapshot_of(source: &dyn BackingSource) -> Self {
        let map = source.entries().into_iter().collect();
        Self::from_map(map).with_kind(&source.kind())
    }

    pub fn with_kind(mut self, kind: &str) -> Self {
        self.kind = kind.to_string();
        self
    }

    pub fn sealed(mut self) -> Self {
        self.sealed = true;
        self
    }

    pub fn to_value(&self) -> Value {
        Value::Object(
            self.data
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        )
    }

    fn check_known(&self, data: &Map<String, Value>, name: &str) -> Result<()> {
        if self.sealed && !data.contains_key(name) {
            return Err(AdaptError::WriteRejected {
                member: name.to_string(),
                reason: "sealed source has no such key".to_string(),
            });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.data.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MapSource {
    fn default() -> Self {
        Self::new()
    }
}

impl BackingSource for MapSource {
    fn kind(&self) -> String {
        self.kind.clone()
    }

    fn get(&self, name: &str) -> Option<Value> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn set(&self, name: &str, value: Value) -> Result<()> {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        self.check_known(&data, name)?;
        data.insert(name.to_string(), value);
        Ok(())
    }

    /// 整個讀-改-寫都在寫鎖內完成
    fn update(
        &self,
        name: &str,
        apply: &mut dyn FnMut(Option<Value>) -> Result<Value>,
    ) -> Result<()> {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        self.check_known(&data, name)?;
        let value = apply(data.get(name).cloned())?;
        data.insert(name.to_string(), value);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    fn has(&self, name: &str) -> bool {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::ValueType;
    use serde_json::json;

    #[test]
    fn test_keys_keep_declared_order() {
        let source = MapSource::from_json_str(r#"{"zeta": 1, "alpha": "a", "mid": true}"#).unwrap();
        assert_eq!(source.keys(), vec!["zeta", "alpha", "mid"]);

        let signature = source.signature();
        assert_eq!(signature.kind, "object");
        assert_eq!(signature.field_type("alpha"), Some(ValueType::String));
        assert_eq!(signature.field_type("zeta"), Some(ValueType::Integer));
    }

    #[test]
    fn test_signature_ignores_values() {
        let a = MapSource::from_value(json!({"Name": "a"})).unwrap();
        let b = MapSource::from_value(json!({"Name": "b"})).unwrap();
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert!(MapSource::from_value(json!([1, 2])).is_err());
        assert!(MapSource::from_json_str("not json").is_err());
    }

    #[test]
    fn test_from_pairs() {
        let source = MapSource::from_pairs([("port", "8080"), ("host", "localhost")]);
        assert_eq!(source.get("port"), Some(json!("8080")));
        assert_eq!(source.kind(), "map");
    }

    #[test]
    fn test_sealed_rejects_new_keys() {
        let source = MapSource::from_value(json!({"Name": "a"})).unwrap().sealed();
        assert!(source.set("Name", json!("b")).is_ok());
        assert!(matches!(
            source.set("Other", json!(1)),
            Err(AdaptError::WriteRejected { .. })
        ));
    }

    #[test]
    fn test_snapshot_is_detached() {
        let original = MapSource::from_value(json!({"Name": "a"})).unwrap();
        let copy = MapSource::snapshot_of(&original);
        original.set("Name", json!("b")).unwrap();

        assert_eq!(copy.get("Name"), Some(json!("a")));
        assert_eq!(copy.kind(), original.kind());
    }
}
