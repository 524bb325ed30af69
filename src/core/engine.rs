use crate::adapters::{MapSource, NestedSource};
use crate::core::adapter::DuckAdapter;
use crate::core::binder::{Blueprint, PropertyBinder};
use crate::core::cache::{BlueprintKey, CacheStats, ResetOnDrop, ShapeCache};
use crate::core::converter::ConverterRegistry;
use crate::core::shape::{MemberTag, ShapeDescriptor};
use crate::domain::model::{AdaptOptions, ShapeSpec};
use crate::domain::ports::{BackingSource, ShapeProvider};
use crate::utils::error::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

struct EngineInner {
    registry: ConverterRegistry,
    cache: ShapeCache,
    descriptors: RwLock<HashMap<ShapeSpec, Arc<ShapeDescriptor>>>,
}

/// 適配引擎：擁有轉換器註冊表與 shape 快取
///
/// clone 很便宜，所有 clone 共用同一份快取。
#[derive(Clone)]
pub struct DuckEngine {
    inner: Arc<EngineInner>,
}

impl DuckEngine {
    pub fn new() -> Self {
        Self::with_registry(ConverterRegistry::new())
    }

    /// 註冊表在交給引擎之後就不再變動
    pub fn with_registry(registry: ConverterRegistry) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                registry,
                cache: ShapeCache::new(),
                descriptors: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn registry(&self) -> &ConverterRegistry {
        &self.inner.registry
    }

    /// 每個不同的規格只建立一次描述
    pub fn descriptor(&self, spec: &ShapeSpec) -> Result<Arc<ShapeDescriptor>> {
        if let Some(shape) = self
            .inner
            .descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(spec)
        {
            return Ok(Arc::clone(shape));
        }

        let shape = ShapeDescriptor::build(spec)?;
        let mut descriptors = self
            .inner
            .descriptors
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(descriptors.entry(spec.clone()).or_insert(shape)))
    }

    pub fn adapt(
        &self,
        source: Arc<dyn BackingSource>,
        spec: &ShapeSpec,
        options: AdaptOptions,
    ) -> Result<DuckAdapter> {
        let shape = self.descriptor(spec)?;
        self.adapt_descriptor(source, shape, options)
    }

    pub fn adapt_as<T: ShapeProvider>(
        &self,
        source: Arc<dyn BackingSource>,
        options: AdaptOptions,
    ) -> Result<DuckAdapter> {
        self.adapt(source, &T::shape_spec(), options)
    }

    /// 直接 adapt 一個 JSON 物件
    pub fn adapt_value(
        &self,
        value: Value,
        spec: &ShapeSpec,
        options: AdaptOptions,
    ) -> Result<DuckAdapter> {
        self.adapt(Arc::new(MapSource::from_value(value)?), spec, options)
    }

    pub fn adapt_descriptor(
        &self,
        source: Arc<dyn BackingSource>,
        shape: Arc<ShapeDescriptor>,
        options: AdaptOptions,
    ) -> Result<DuckAdapter> {
        let source: Arc<dyn BackingSource> = if options.write_through {
            source
        } else {
            Arc::new(MapSource::snapshot_of(source.as_ref()))
        };

        let key = BlueprintKey {
            shape,
            source: source.signature(),
        };
        let blueprint = self.inner.cache.get_or_generate(&key, || {
            Ok(PropertyBinder::new(&self.inner.registry).bind(&key.shape, &key.source))
        })?;

        if options.strict_conversion {
            blueprint.ensure_strict()?;
            self.ensure_nested_strict(&blueprint, &source, options)?;
        }

        tracing::debug!(
            "🦆 Adapted {} to {} ({})",
            key.source.kind,
            key.shape.name(),
            if options.write_through { "write-through" } else { "snapshot" }
        );

        Ok(DuckAdapter::instantiate(
            self.clone(),
            blueprint,
            source,
            options,
        ))
    }

    /// 嚴格模式下巢狀成員也要在 adapt 時以巢狀值自己的簽章檢查；集合維持惰性
    fn ensure_nested_strict(
        &self,
        blueprint: &Blueprint,
        source: &Arc<dyn BackingSource>,
        options: AdaptOptions,
    ) -> Result<()> {
        for binding in blueprint.bindings() {
            let (MemberTag::Nested(inner), Some(key)) = (&binding.member.tag, &binding.key) else {
                continue;
            };
            if !source.get(key).is_some_and(|v| v.is_object()) {
                continue;
            }
            let nested: Arc<dyn BackingSource> =
                Arc::new(NestedSource::new(Arc::clone(source), key));
            let options = AdaptOptions {
                write_through: true,
                ..options
            };
            self.adapt_descriptor(nested, Arc::clone(inner), options)?;
        }
        Ok(())
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    pub fn reset_cache(&self) {
        self.inner
            .descriptors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.inner.cache.reset();
    }

    pub fn reset_on_drop(&self) -> ResetOnDrop<'_> {
        self.inner.cache.reset_on_drop()
    }
}

impl Default for DuckEngine {
    fn default() -> Self {
        Self::new()
    }
}
