use crate::core::binder::Blueprint;
use crate::core::shape::ShapeDescriptor;
use crate::domain::ports::SourceSignature;
use crate::utils::error::{AdaptError, Result};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlueprintKey {
    pub shape: Arc<ShapeDescriptor>,
    pub source: SourceSignature,
}

impl fmt::Display for BlueprintKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.shape.name(), self.source)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub generations: u64,
    pub failures: u64,
    pub entries: usize,
}

/// 一次進行中的生成；等待者在 `done` 上等結果
struct Flight {
    result: Mutex<Option<Result<Arc<Blueprint>>>>,
    done: Condvar,
}

impl Flight {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            done: Condvar::new(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "blueprint synthesis panicked".to_string()
    }
}

/// (shape 簽章, 來源簽章) -> Blueprint 的快取
///
/// 命中時只取讀鎖。未命中時同一個 key 只會有一個生成在進行，其他呼叫者
/// 等待並拿到同一個結果（成功或失敗）。失敗不會留在快取中，下一次呼叫
/// 會重新生成。除了 `reset` 以外沒有淘汰策略。
pub struct ShapeCache {
    entries: RwLock<HashMap<BlueprintKey, Arc<Blueprint>>>,
    in_flight: Mutex<HashMap<BlueprintKey, Arc<Flight>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    generations: AtomicU64,
    failures: AtomicU64,
    /// 每次 reset 遞增；reset 之前開始的生成結果不寫入
    epoch: AtomicU64,
}

impl ShapeCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            generations: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &BlueprintKey) -> Option<Arc<Blueprint>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn get_or_generate<F>(&self, key: &BlueprintKey, generate: F) -> Result<Arc<Blueprint>>
    where
        F: FnOnce() -> Result<Blueprint>,
    {
        if let Some(blueprint) = self.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(blueprint);
        }

        let (flight, leader, epoch) = {
            let mut in_flight = lock(&self.in_flight);
            // 領頭者會先寫入 entries 再移除 in_flight，所以這裡要再查一次
            if let Some(blueprint) = self.get(key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(blueprint);
            }
            let epoch = self.epoch.load(Ordering::SeqCst);
            match in_flight.get(key) {
                Some(flight) => (Arc::clone(flight), false, epoch),
                None => {
                    let flight = Arc::new(Flight::new());
                    in_flight.insert(key.clone(), Arc::clone(&flight));
                    (flight, true, epoch)
                }
            }
        };
        self.misses.fetch_add(1, Ordering::Relaxed);

        if !leader {
            tracing::debug!("⏳ Waiting for in-flight blueprint {}", key);
            let mut result = lock(&flight.result);
            loop {
                if let Some(outcome) = result.as_ref() {
                    return outcome.clone();
                }
                result = flight
                    .done
                    .wait(result)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }

        tracing::debug!("🔧 Generating blueprint {}", key);
        self.generations.fetch_add(1, Ordering::Relaxed);
        let outcome = match catch_unwind(AssertUnwindSafe(generate)) {
            Ok(Ok(blueprint)) => Ok(Arc::new(blueprint)),
            Ok(Err(e)) => Err(AdaptError::CacheGenerationFailed {
                signature: key.to_string(),
                message: e.to_string(),
            }),
            Err(payload) => Err(AdaptError::CacheGenerationFailed {
                signature: key.to_string(),
                message: panic_message(payload.as_ref()),
            }),
        };

        match &outcome {
            Ok(blueprint) => {
                let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
                if self.epoch.load(Ordering::SeqCst) == epoch {
                    entries.insert(key.clone(), Arc::clone(blueprint));
                } else {
                    tracing::debug!("🧹 Discarding blueprint {} generated before reset", key);
                }
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("⚠️ {}", e);
            }
        }

        {
            let mut in_flight = lock(&self.in_flight);
            // reset 之後同一個 key 可能已經有新的生成在進行
            if in_flight.get(key).is_some_and(|f| Arc::ptr_eq(f, &flight)) {
                in_flight.remove(key);
            }
        }
        *lock(&flight.result) = Some(outcome.clone());
        flight.done.notify_all();

        outcome
    }

    /// 清空所有條目與計數器（主要給測試用）
    pub fn reset(&self) {
        let mut in_flight = lock(&self.in_flight);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        in_flight.clear();
        entries.clear();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        drop(entries);
        drop(in_flight);

        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.generations.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
        tracing::debug!("🧹 Shape cache reset");
    }

    /// 離開作用域時自動 reset
    pub fn reset_on_drop(&self) -> ResetOnDrop<'_> {
        ResetOnDrop { cache: self }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            generations: self.generations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            entries: self
                .entries
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
        }
    }
}

impl Default for ShapeCache {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ResetOnDrop<'a> {
    cache: &'a ShapeCache,
}

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.cache.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::binder::PropertyBinder;
    use crate::core::converter::ConverterRegistry;
    use crate::domain::model::{ShapeSpec, ValueType};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::time::Duration;

    fn key() -> BlueprintKey {
        let shape = ShapeDescriptor::build(
            &ShapeSpec::new("User").read_write("Name", ValueType::String),
        )
        .unwrap();
        BlueprintKey {
            shape,
            source: SourceSignature {
                kind: "map".to_string(),
                fields: vec![("name".to_string(), ValueType::String)],
            },
        }
    }

    fn generate(key: &BlueprintKey) -> Blueprint {
        let registry = ConverterRegistry::new();
        PropertyBinder::new(&registry).bind(&key.shape, &key.source)
    }

    #[test]
    fn test_second_lookup_is_a_hit() {
        let cache = ShapeCache::new();
        let key = key();

        let first = cache.get_or_generate(&key, || Ok(generate(&key))).unwrap();
        let second = cache
            .get_or_generate(&key, || panic!("must not regenerate"))
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        let stats = cache.stats();
        assert_eq!(stats.generations, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_concurrent_misses_generate_once() {
        let cache = ShapeCache::new();
        let key = key();
        let calls = AtomicUsize::new(0);
        let threads = 8;
        let barrier = Barrier::new(threads);

        let results: Vec<Arc<Blueprint>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        cache
                            .get_or_generate(&key, || {
                                calls.fetch_add(1, Ordering::SeqCst);
                                std::thread::sleep(Duration::from_millis(50));
                                Ok(generate(&key))
                            })
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().generations, 1);
        assert!(results.iter().all(|bp| Arc::ptr_eq(bp, &results[0])));
    }

    #[test]
    fn test_failure_is_shared_and_not_cached() {
        let cache = ShapeCache::new();
        let key = key();
        let threads = 4;
        let barrier = Barrier::new(threads);

        let results: Vec<Result<Arc<Blueprint>>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        cache.get_or_generate(&key, || {
                            std::thread::sleep(Duration::from_millis(200));
                            panic!("synthesis exploded");
                        })
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for result in &results {
            match result {
                Err(AdaptError::CacheGenerationFailed { message, .. }) => {
                    assert_eq!(message, "synthesis exploded")
                }
                other => panic!("unexpected result: {:?}", other.as_ref().map(|_| ())),
            }
        }
        assert_eq!(cache.stats().generations, 1);
        assert_eq!(cache.stats().entries, 0);

        // 下一次呼叫重新生成
        let retried = cache.get_or_generate(&key, || Ok(generate(&key)));
        assert!(retried.is_ok());
        assert_eq!(cache.stats().generations, 2);
    }

    #[test]
    fn test_error_from_generator_is_wrapped() {
        let cache = ShapeCache::new();
        let key = key();
        let err = cache
            .get_or_generate(&key, || {
                Err(AdaptError::ConfigError {
                    message: "bad".to_string(),
                })
            })
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_reset_during_generation_discards_result() {
        let cache = ShapeCache::new();
        let key = key();

        let stale = cache
            .get_or_generate(&key, || {
                cache.reset();
                Ok(generate(&key))
            })
            .unwrap();
        assert_eq!(cache.stats().entries, 0);

        let fresh = cache.get_or_generate(&key, || Ok(generate(&key))).unwrap();
        assert!(!Arc::ptr_eq(&stale, &fresh));
        assert_eq!(cache.stats().entries, 1);
        assert_eq!(cache.stats().generations, 1);
    }

    #[test]
    fn test_reset_on_drop() {
        let cache = ShapeCache::new();
        let key = key();
        {
            let _guard = cache.reset_on_drop();
            cache.get_or_generate(&key, || Ok(generate(&key))).unwrap();
            assert_eq!(cache.stats().entries, 1);
        }
        assert_eq!(cache.stats(), CacheStats::default());
    }
}
