//! Part Cache
//!
//! Process-lifetime memoisation of prologs and epilogs. Many full-shader
//! variants share the same small fragments ("fetch with instance divisor on
//! attribute 2", "export one FP16 color target"), so each distinct
//! [`ShaderPartKey`] is compiled exactly once per device.
//!
//! # Storage
//!
//! One store per [`PartCategory`], each an append-only arena
//! (`Vec<Arc<ShaderPart>>`) plus an `FxHashMap` from key to arena index.
//! Entries are never evicted; they live until the owning device is dropped.
//!
//! # Concurrency
//!
//! Each category has its own lock. A miss compiles *while holding* that
//! lock, so concurrent requests for the same uncached key never compile
//! twice; misses of different keys in the same category serialise. Failed
//! or panicking builds are not recorded, the next request compiles again.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use prism_core::{PartCategory, PrismError, RegisterUsage, Result, ShaderPartKey};

use crate::backend::CompiledCode;

/// An immutable cached prolog or epilog.
#[derive(Debug)]
pub struct ShaderPart {
    key: ShaderPartKey,
    code: Vec<u8>,
    usage: RegisterUsage,
    num_input_sgprs: u8,
}

impl ShaderPart {
    #[inline]
    #[must_use]
    pub fn key(&self) -> &ShaderPartKey {
        &self.key
    }

    #[inline]
    #[must_use]
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    #[inline]
    #[must_use]
    pub fn usage(&self) -> &RegisterUsage {
        &self.usage
    }

    #[inline]
    #[must_use]
    pub fn num_input_sgprs(&self) -> u8 {
        self.num_input_sgprs
    }
}

/// Counters of one category, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartCacheStats {
    pub entries: usize,
    pub lookups: u64,
    pub builds: u64,
    pub failures: u64,
}

#[derive(Default)]
struct CategoryStore {
    parts: Vec<Arc<ShaderPart>>,
    lookup: FxHashMap<ShaderPartKey, usize>,
    lookups: u64,
    builds: u64,
    failures: u64,
}

/// The four part caches of one device.
pub struct PartCache {
    stores: [Mutex<CategoryStore>; 4],
}

impl Default for PartCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PartCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stores: std::array::from_fn(|_| Mutex::new(CategoryStore::default())),
        }
    }

    /// Return the cached part for `key`, compiling it with `build` on a miss.
    ///
    /// The category is implied by the key. `build` runs with the category
    /// lock held and must not re-enter this cache for the same category.
    pub fn get_or_build<F>(&self, key: &ShaderPartKey, build: F) -> Result<Arc<ShaderPart>>
    where
        F: FnOnce(&ShaderPartKey) -> Result<CompiledCode>,
    {
        let category = key.category();
        let mut store = self.stores[category.index()].lock();
        store.lookups += 1;

        if let Some(&index) = store.lookup.get(key) {
            log::trace!("{category} cache hit (#{index})");
            return Ok(Arc::clone(&store.parts[index]));
        }

        log::debug!("Compiling {category} ({} cached)", store.parts.len());
        store.builds += 1;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| build(key)))
            .unwrap_or_else(|payload| Err(PrismError::from_panic(key.name(), payload.as_ref())));
        let compiled = match outcome {
            Ok(compiled) => compiled,
            Err(e) => {
                store.failures += 1;
                return Err(e);
            }
        };

        let part = Arc::new(ShaderPart {
            key: *key,
            code: compiled.code,
            usage: compiled.usage,
            num_input_sgprs: compiled.num_input_sgprs,
        });
        let index = store.parts.len();
        store.parts.push(Arc::clone(&part));
        store.lookup.insert(*key, index);
        Ok(part)
    }

    /// Cached part for `key` without building.
    #[must_use]
    pub fn get(&self, key: &ShaderPartKey) -> Option<Arc<ShaderPart>> {
        let store = self.stores[key.category().index()].lock();
        store.lookup.get(key).map(|&i| Arc::clone(&store.parts[i]))
    }

    #[must_use]
    pub fn len(&self, category: PartCategory) -> usize {
        self.stores[category.index()].lock().parts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stores.iter().all(|s| s.lock().parts.is_empty())
    }

    #[must_use]
    pub fn stats(&self, category: PartCategory) -> PartCacheStats {
        let store = self.stores[category.index()].lock();
        PartCacheStats {
            entries: store.parts.len(),
            lookups: store.lookups,
            builds: store.builds,
            failures: store.failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::{PsEpilogKey, TcsEpilogKey};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn epilog(colors: u8) -> ShaderPartKey {
        ShaderPartKey::PsEpilog(PsEpilogKey {
            colors_written: colors,
            ..Default::default()
        })
    }

    fn compiled(byte: u8, vgprs: u32) -> CompiledCode {
        CompiledCode {
            code: vec![byte; 4],
            usage: RegisterUsage {
                num_vgprs: vgprs,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_equal_keys_share_one_part() {
        let cache = PartCache::new();
        let builds = AtomicUsize::new(0);
        let build = |_: &ShaderPartKey| {
            builds.fetch_add(1, Ordering::SeqCst);
            Ok(compiled(1, 8))
        };

        let a = cache.get_or_build(&epilog(1), build).unwrap();
        let b = cache.get_or_build(&epilog(1), build).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(PartCategory::PsEpilog), 1);
        assert_eq!(cache.len(PartCategory::PsProlog), 0);
    }

    #[test]
    fn test_categories_are_independent() {
        let cache = PartCache::new();
        let tcs = ShaderPartKey::TcsEpilog(TcsEpilogKey::default());
        cache.get_or_build(&epilog(1), |_| Ok(compiled(1, 4))).unwrap();
        cache.get_or_build(&tcs, |_| Ok(compiled(2, 4))).unwrap();
        assert_eq!(cache.len(PartCategory::PsEpilog), 1);
        assert_eq!(cache.len(PartCategory::TcsEpilog), 1);
        assert_eq!(cache.get(&tcs).unwrap().code(), &[2, 2, 2, 2]);
    }

    #[test]
    fn test_failure_is_not_cached() {
        let cache = PartCache::new();
        let err = cache
            .get_or_build(&epilog(3), |_| Err(PrismError::compile("fragment epilog", "boom")))
            .unwrap_err();
        assert!(matches!(err, PrismError::Compile { .. }));
        assert!(cache.get(&epilog(3)).is_none());

        let part = cache.get_or_build(&epilog(3), |_| Ok(compiled(3, 2))).unwrap();
        assert_eq!(part.usage().num_vgprs, 2);

        let stats = cache.stats(PartCategory::PsEpilog);
        assert_eq!(stats.builds, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_panicking_build_counts_as_failure() {
        let cache = PartCache::new();
        let err = cache
            .get_or_build(&epilog(5), |_| panic!("export lowering"))
            .unwrap_err();
        assert_eq!(err, PrismError::compile("fragment epilog", "panicked: export lowering"));
        assert!(cache.get(&epilog(5)).is_none());

        cache.get_or_build(&epilog(5), |_| Ok(compiled(5, 4))).unwrap();
        let stats = cache.stats(PartCategory::PsEpilog);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.entries, 1);
    }
}
