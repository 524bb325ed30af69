use crate::domain::ports::BackingSource;
use crate::utils::error::{AdaptError, Result};
use serde_json::{Map, Value};
use std::sync::Arc;

fn object_keys(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Object(map)) => map.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

/// 寫入巢狀物件中的一個欄位；物件不存在時建立新物件
fn write_field(target: Option<Value>, name: &str, value: Value, path: &str) -> Result<Value> {
    match target {
        Some(Value::Object(mut map)) => {
            map.insert(name.to_string(), value);
            Ok(Value::Object(map))
        }
        None | Some(Value::Null) => {
            let mut map = Map::new();
            map.insert(name.to_string(), value);
            Ok(Value::Object(map))
        }
        Some(_) => Err(AdaptError::WriteRejected {
            member: format!("{}.{}", path, name),
            reason: "value is not an object".to_string(),
        }),
    }
}

/// 父來源中某個 key 底下的物件，讀寫都直接作用在父來源上
pub struct NestedSource {
    parent: Arc<dyn BackingSource>,
    key: String,
}

impl NestedSource {
    pub fn new(parent: Arc<dyn BackingSource>, key: &str) -> Self {
        Self {
            parent,
            key: key.to_string(),
        }
    }
}

impl BackingSource for NestedSource {
    fn kind(&self) -> String {
        "nested".to_string()
    }

    fn get(&self, name: &str) -> Option<Value> {
        self.parent.get(&self.key)?.get(name).cloned()
    }

    fn set(&self, name: &str, value: Value) -> Result<()> {
        let mut value = Some(value);
        self.update(name, &mut |_| Ok(value.take().unwrap_or_default()))
    }

    /// 透過父來源的 update 寫入，整條路徑在最外層來源的鎖內完成
    fn update(
        &self,
        name: &str,
        apply: &mut dyn FnMut(Option<Value>) -> Result<Value>,
    ) -> Result<()> {
        self.parent.update(&self.key, &mut |outer| {
            let current = outer.as_ref().and_then(|o| o.get(name)).cloned();
            let value = apply(current)?;
            write_field(outer, name, value, &self.key)
        })
    }

    fn keys(&self) -> Vec<String> {
        object_keys(self.parent.get(&self.key).as_ref())
    }
}

/// 父來源中某個陣列的第 `index` 個元素
pub struct ElementSource {
    parent: Arc<dyn BackingSource>,
    key: String,
    index: usize,
}

impl ElementSource {
    pub fn new(parent: Arc<dyn BackingSource>, key: &str, index: usize) -> Self {
        Self {
            parent,
            key: key.to_string(),
            index,
        }
    }

    fn element(&self) -> Option<Value> {
        self.parent.get(&self.key)?.get(self.index).cloned()
    }
}

impl BackingSource for ElementSource {
    fn kind(&self) -> String {
        "element".to_string()
    }

    fn get(&self, name: &str) -> Option<Value> {
        self.element()?.get(name).cloned()
    }

    fn set(&self, name: &str, value: Value) -> Result<()> {
        let mut value = Some(value);
        self.update(name, &mut |_| Ok(value.take().unwrap_or_default()))
    }

    fn update(
        &self,
        name: &str,
        apply: &mut dyn FnMut(Option<Value>) -> Result<Value>,
    ) -> Result<()> {
        let path = format!("{}[{}]", self.key, self.index);
        self.parent.update(&self.key, &mut |items| {
            let mut items = match items {
                Some(Value::Array(items)) if self.index < items.len() => items,
                _ => {
                    return Err(AdaptError::WriteRejected {
                        member: format!("{}.{}", path, name),
                        reason: "element no longer exists".to_string(),
                    })
                }
            };

            let current = std::mem::take(&mut items[self.index]);
            let value = apply(current.get(name).cloned())?;
            items[self.index] = write_field(Some(current), name, value, &path)?;
            Ok(Value::Array(items))
        })
    }

    fn keys(&self) -> Vec<String> {
        object_keys(self.element().as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::map::MapSource;
    use serde_json::json;

    fn parent() -> Arc<dyn BackingSource> {
        Arc::new(
            MapSource::from_value(json!({
                "address": {"city": "Taipei", "zip": "100"},
                "lines": [{"sku": "A"}, {"sku": "B"}],
                "label": "x"
            }))
            .unwrap(),
        )
    }

    #[test]
    fn test_nested_reads_and_writes_through() {
        let parent = parent();
        let nested = NestedSource::new(Arc::clone(&parent), "address");

        assert_eq!(nested.keys(), vec!["city", "zip"]);
        assert_eq!(nested.get("city"), Some(json!("Taipei")));

        nested.set("city", json!("Tainan")).unwrap();
        assert_eq!(parent.get("address").unwrap()["city"], json!("Tainan"));
    }

    #[test]
    fn test_nested_creates_missing_object() {
        let parent = parent();
        let nested = NestedSource::new(Arc::clone(&parent), "profile");
        assert!(nested.keys().is_empty());

        nested.set("theme", json!("dark")).unwrap();
        assert_eq!(parent.get("profile"), Some(json!({"theme": "dark"})));
    }

    #[test]
    fn test_nested_on_scalar_rejects_writes() {
        let nested = NestedSource::new(parent(), "label");
        assert!(nested.keys().is_empty());
        assert!(nested.set("x", json!(1)).is_err());
    }

    #[test]
    fn test_update_applies_to_current_value() {
        let parent = parent();
        let nested = NestedSource::new(Arc::clone(&parent), "address");
        nested
            .update("zip", &mut |zip| {
                let zip = zip.and_then(|z| z.as_str().map(str::to_string)).unwrap_or_default();
                Ok(json!(format!("{}-01", zip)))
            })
            .unwrap();
        assert_eq!(parent.get("address").unwrap()["zip"], json!("100-01"));

        // 失敗時父來源不變
        let failed = nested.update("zip", &mut |_| {
            Err(AdaptError::WriteRejected {
                member: "zip".to_string(),
                reason: "rejected".to_string(),
            })
        });
        assert!(failed.is_err());
        assert_eq!(parent.get("address").unwrap()["zip"], json!("100-01"));
    }

    #[test]
    fn test_concurrent_element_writes_keep_both_fields() {
        let parent: Arc<dyn BackingSource> =
            Arc::new(MapSource::from_value(json!({"lines": [{"a": 0, "b": 0}]})).unwrap());

        std::thread::scope(|s| {
            for field in ["a", "b"] {
                let element = ElementSource::new(Arc::clone(&parent), "lines", 0);
                s.spawn(move || {
                    for n in 1..=100 {
                        element.set(field, json!(n)).unwrap();
                    }
                });
            }
        });

        assert_eq!(parent.get("lines"), Some(json!([{"a": 100, "b": 100}])));
    }

    #[test]
    fn test_element_reads_and_writes_through() {
        let parent = parent();
        let second = ElementSource::new(Arc::clone(&parent), "lines", 1);
        assert_eq!(second.get("sku"), Some(json!("B")));

        second.set("sku", json!("C")).unwrap();
        assert_eq!(parent.get("lines"), Some(json!([{"sku": "A"}, {"sku": "C"}])));

        let missing = ElementSource::new(parent, "lines", 5);
        assert!(missing.get("sku").is_none());
        assert!(missing.set("sku", json!("D")).is_err());
    }
}
