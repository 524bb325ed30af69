use crate::adapters::{ElementSource, MapSource, NestedSource};
use crate::core::binder::{Binding, Blueprint, BoundConversion};
use crate::core::converter::{Conversion, Resolution};
use crate::core::engine::DuckEngine;
use crate::core::shape::{MemberDescriptor, MemberTag, ShapeDescriptor};
use crate::domain::model::{AdaptOptions, ValueType};
use crate::domain::ports::BackingSource;
use crate::utils::error::{AdaptError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

type Reader = Box<dyn Fn() -> Result<Value> + Send + Sync>;
type Writer = Box<dyn Fn(Value) -> Result<()> + Send + Sync>;

/// 單一成員的 get/set 函式對，閉包內含後端來源與解析好的轉換器
struct MemberAccessor {
    read: Reader,
    write: Writer,
}

impl MemberAccessor {
    fn build(
        engine: &DuckEngine,
        shape: &str,
        binding: &Binding,
        source: &Arc<dyn BackingSource>,
        options: AdaptOptions,
    ) -> Self {
        let member = binding.member.clone();
        let Some(key) = binding.key.clone() else {
            return Self::unbound(shape, member, options);
        };
        let to = member.value_type;

        let read: Reader = {
            let engine = engine.clone();
            let source = Arc::clone(source);
            let key = key.clone();
            let conversion = binding.conversion.clone();
            Box::new(move || -> Result<Value> {
                let value = source.get(&key).unwrap_or(Value::Null);
                if value.is_null() {
                    return Ok(Value::Null);
                }
                Ok(match &conversion {
                    BoundConversion::Convert(c) => c.forward(&value),
                    BoundConversion::Deferred => match live_conversion(&engine, &value, to) {
                        Some(c) => c.forward(&value),
                        None => value,
                    },
                    _ => value,
                })
            })
        };

        let write: Writer = if member.is_writable() {
            let engine = engine.clone();
            let source = Arc::clone(source);
            let conversion = binding.conversion.clone();
            let shape = shape.to_string();
            Box::new(move |value: Value| -> Result<()> {
                if value.is_null() {
                    return source.set(&key, value);
                }
                let live = match &conversion {
                    BoundConversion::Convert(c) => Some(c.clone()),
                    BoundConversion::Deferred => source
                        .get(&key)
                        .and_then(|current| live_conversion(&engine, &current, to)),
                    _ => None,
                };
                let value = match live {
                    // 無法轉回後端型別時不動來源
                    Some(c) => c.try_backward(&value).ok_or_else(|| {
                        AdaptError::ConversionFailed {
                            shape: shape.clone(),
                            member: member.name.clone(),
                            from: ValueType::of(&value),
                            to: c.from_type(),
                        }
                    })?,
                    None => value,
                };
                source.set(&key, value)
            })
        } else {
            let shape = shape.to_string();
            Box::new(move |_: Value| -> Result<()> {
                Err(AdaptError::ReadOnlyMember {
                    shape: shape.clone(),
                    member: member.name.clone(),
                })
            })
        };

        Self { read, write }
    }

    fn unbound(shape: &str, member: MemberDescriptor, options: AdaptOptions) -> Self {
        let error = AdaptError::MemberUnbound {
            shape: shape.to_string(),
            member: member.name.clone(),
        };

        let write: Writer = if !member.is_writable() {
            let read_only = AdaptError::ReadOnlyMember {
                shape: shape.to_string(),
                member: member.name.clone(),
            };
            Box::new(move |_: Value| -> Result<()> { Err(read_only.clone()) })
        } else if options.allow_unmatched_members {
            Box::new(|_: Value| -> Result<()> { Ok(()) })
        } else {
            let write_error = error.clone();
            Box::new(move |_: Value| -> Result<()> { Err(write_error.clone()) })
        };

        let read: Reader = if options.allow_unmatched_members {
            let default = member.default_value();
            let name = member.name;
            Box::new(move || -> Result<Value> {
                tracing::debug!("Unbound member '{}' read as default", name);
                Ok(default.clone())
            })
        } else {
            Box::new(move || -> Result<Value> { Err(error.clone()) })
        };

        Self { read, write }
    }
}

/// 綁定時型別未知的成員，依目前的值解析轉換器
fn live_conversion(engine: &DuckEngine, current: &Value, to: ValueType) -> Option<Conversion> {
    if current.is_null() {
        return None;
    }
    match engine.registry().resolve(ValueType::of(current), to) {
        Some(Resolution::Convert(c)) => Some(c),
        _ => None,
    }
}

/// 滿足目標 shape 的代理物件
///
/// 本身不擁有資料：write-through 模式下讀寫直接作用在來源上，snapshot
/// 模式下作用在 adapt 當下複製出來的私有 map。
#[derive(Clone)]
pub struct DuckAdapter {
    engine: DuckEngine,
    blueprint: Arc<Blueprint>,
    source: Arc<dyn BackingSource>,
    options: AdaptOptions,
    accessors: Arc<[MemberAccessor]>,
}

impl DuckAdapter {
    pub(crate) fn instantiate(
        engine: DuckEngine,
        blueprint: Arc<Blueprint>,
        source: Arc<dyn BackingSource>,
        options: AdaptOptions,
    ) -> Self {
        let shape = blueprint.shape().name().to_string();
        let accessors: Vec<MemberAccessor> = blueprint
            .bindings()
            .iter()
            .map(|binding| MemberAccessor::build(&engine, &shape, binding, &source, options))
            .collect();

        Self {
            engine,
            blueprint,
            source,
            options,
            accessors: accessors.into(),
        }
    }

    pub fn shape(&self) -> &Arc<ShapeDescriptor> {
        self.blueprint.shape()
    }

    pub fn blueprint(&self) -> &Arc<Blueprint> {
        &self.blueprint
    }

    pub fn options(&self) -> AdaptOptions {
        self.options
    }

    /// 目前讀寫的來源（snapshot 模式下是私有副本）
    pub fn source(&self) -> &Arc<dyn BackingSource> {
        &self.source
    }

    fn index_of(&self, member: &str) -> Result<usize> {
        self.shape()
            .find(member)
            .map(|(idx, _)| idx)
            .ok_or_else(|| AdaptError::UnknownMember {
                shape: self.shape().name().to_string(),
                member: member.to_string(),
            })
    }

    pub fn is_bound(&self, member: &str) -> bool {
        self.index_of(member)
            .map(|idx| self.blueprint.bindings()[idx].is_bound())
            .unwrap_or(false)
    }

    pub fn get(&self, member: &str) -> Result<Value> {
        let idx = self.index_of(member)?;
        (self.accessors[idx].read)()
    }

    pub fn set(&self, member: &str, value: Value) -> Result<()> {
        let idx = self.index_of(member)?;
        (self.accessors[idx].write)(value)
    }

    pub fn get_as<T: DeserializeOwned>(&self, member: &str) -> Result<T> {
        Ok(serde_json::from_value(self.get(member)?)?)
    }

    pub fn set_as<T: Serialize>(&self, member: &str, value: &T) -> Result<()> {
        self.set(member, serde_json::to_value(value)?)
    }

    fn inner_shape(&self, member: &str, nested: bool) -> Result<(usize, Arc<ShapeDescriptor>)> {
        let idx = self.index_of(member)?;
        match (&self.shape().members()[idx].tag, nested) {
            (MemberTag::Nested(inner), true) | (MemberTag::Collection(inner), false) => {
                Ok((idx, Arc::clone(inner)))
            }
            _ => Err(AdaptError::UnknownMember {
                shape: self.shape().name().to_string(),
                member: format!(
                    "{} (not a {} member)",
                    member,
                    if nested { "nested" } else { "collection" }
                ),
            }),
        }
    }

    fn unbound_error(&self, idx: usize) -> AdaptError {
        AdaptError::MemberUnbound {
            shape: self.shape().name().to_string(),
            member: self.shape().members()[idx].name.clone(),
        }
    }

    /// 巢狀 shape 成員，以巢狀值自己的簽章 adapt
    pub fn nested(&self, member: &str) -> Result<DuckAdapter> {
        let (idx, inner) = self.inner_shape(member, true)?;
        let source: Arc<dyn BackingSource> = match &self.blueprint.bindings()[idx].key {
            Some(key) => Arc::new(NestedSource::new(Arc::clone(&self.source), key)),
            None if self.options.allow_unmatched_members => Arc::new(MapSource::new()),
            None => return Err(self.unbound_error(idx)),
        };

        // 已經是私有副本時，內層直接寫回這份副本
        let options = AdaptOptions {
            write_through: true,
            ..self.options
        };
        self.engine.adapt_descriptor(source, inner, options)
    }

    /// 集合成員：元素在列舉時才逐一 adapt
    pub fn collection(&self, member: &str) -> Result<AdaptedCollection> {
        let (idx, inner) = self.inner_shape(member, false)?;
        let key = match &self.blueprint.bindings()[idx].key {
            Some(key) => Some(key.clone()),
            None if self.options.allow_unmatched_members => None,
            None => return Err(self.unbound_error(idx)),
        };

        let len = key
            .as_ref()
            .and_then(|k| self.source.get(k))
            .and_then(|v| v.as_array().map(Vec::len))
            .unwrap_or(0);

        Ok(AdaptedCollection {
            engine: self.engine.clone(),
            parent: Arc::clone(&self.source),
            key,
            shape: inner,
            options: AdaptOptions {
                write_through: true,
                ..self.options
            },
            index: 0,
            len,
        })
    }

    /// 把所有成員讀成一個 JSON 物件（巢狀與集合遞迴展開）
    pub fn to_value(&self) -> Result<Value> {
        let mut object = Map::new();
        for member in self.shape().members() {
            let raw = self.get(&member.name)?;
            let value = match &member.tag {
                MemberTag::Scalar => raw,
                MemberTag::Nested(_) if raw.is_object() || !self.is_bound(&member.name) => {
                    self.nested(&member.name)?.to_value()?
                }
                MemberTag::Collection(_) if raw.is_array() => Value::Array(
                    self.collection(&member.name)?
                        .map(|item| item.and_then(|adapter| adapter.to_value()))
                        .collect::<Result<Vec<_>>>()?,
                ),
                _ => raw,
            };
            object.insert(member.name.clone(), value);
        }
        Ok(Value::Object(object))
    }

    /// 讀出所有成員並反序列化成宿主型別
    pub fn materialize<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.to_value()?)?)
    }
}

impl BackingSource for DuckAdapter {
    fn kind(&self) -> String {
        format!("adapter:{}", self.shape().name())
    }

    fn get(&self, name: &str) -> Option<Value> {
        DuckAdapter::get(self, name).ok()
    }

    fn set(&self, name: &str, value: Value) -> Result<()> {
        DuckAdapter::set(self, name, value)
    }

    fn keys(&self) -> Vec<String> {
        self.shape()
            .members()
            .iter()
            .map(|m| m.name.clone())
            .collect()
    }
}

impl fmt::Debug for DuckAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuckAdapter")
            .field("blueprint", &self.blueprint.to_string())
            .field("options", &self.options)
            .finish()
    }
}

/// 集合成員的惰性列舉
pub struct AdaptedCollection {
    engine: DuckEngine,
    parent: Arc<dyn BackingSource>,
    key: Option<String>,
    shape: Arc<ShapeDescriptor>,
    options: AdaptOptions,
    index: usize,
    len: usize,
}

impl Iterator for AdaptedCollection {
    type Item = Result<DuckAdapter>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.len {
            return None;
        }
        let key = self.key.as_deref()?;
        let element = ElementSource::new(Arc::clone(&self.parent), key, self.index);
        self.index += 1;
        Some(
            self.engine
                .adapt_descriptor(Arc::new(element), Arc::clone(&self.shape), self.options),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len.saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for AdaptedCollection {}
