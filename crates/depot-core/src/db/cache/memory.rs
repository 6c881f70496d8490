use crate::db::cache::{CacheAdapter, CacheCategory, CacheError, CacheKey, CacheValue};
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

type Region = HashMap<CacheKey, (CacheCategory, Arc<CacheValue>)>;

///
/// MemoryCache
///
/// In-process adapter: one map per cache id behind a single `RwLock`.
/// Entries never expire; categories are recorded but not acted on.
///

#[derive(Debug, Default)]
pub struct MemoryCache {
    regions: RwLock<HashMap<String, Region>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries held under `cache_id`.
    #[must_use]
    pub fn len(&self, cache_id: &str) -> usize {
        self.regions
            .read()
            .map_or(0, |regions| regions.get(cache_id).map_or(0, HashMap::len))
    }

    /// Category an entry was stored under, if present.
    #[must_use]
    pub fn category(&self, cache_id: &str, key: &CacheKey) -> Option<CacheCategory> {
        let regions = self.regions.read().ok()?;

        regions
            .get(cache_id)
            .and_then(|region| region.get(key))
            .map(|(category, _)| *category)
    }

    /// Drop every entry of one category across all cache ids.
    pub fn expire(&self, category: CacheCategory) -> Result<usize, CacheError> {
        let mut regions = self
            .regions
            .write()
            .map_err(|err| CacheError::Poisoned(err.to_string()))?;

        let mut removed = 0;
        for region in regions.values_mut() {
            let before = region.len();
            region.retain(|_, (c, _)| *c != category);
            removed += before - region.len();
        }

        Ok(removed)
    }
}

impl CacheAdapter for MemoryCache {
    fn lookup(&self, cache_id: &str, key: &CacheKey) -> Result<Option<Arc<CacheValue>>, CacheError> {
        let regions = self
            .regions
            .read()
            .map_err(|err| CacheError::Poisoned(err.to_string()))?;

        Ok(regions
            .get(cache_id)
            .and_then(|region| region.get(key))
            .map(|(_, value)| Arc::clone(value)))
    }

    fn store(
        &self,
        category: CacheCategory,
        cache_id: &str,
        key: CacheKey,
        value: CacheValue,
    ) -> Result<(), CacheError> {
        let mut regions = self
            .regions
            .write()
            .map_err(|err| CacheError::Poisoned(err.to_string()))?;

        regions
            .entry(cache_id.to_string())
            .or_default()
            .insert(key, (category, Arc::new(value)));

        Ok(())
    }

    fn remove(&self, cache_id: &str, key: &CacheKey) -> Result<(), CacheError> {
        let mut regions = self
            .regions
            .write()
            .map_err(|err| CacheError::Poisoned(err.to_string()))?;

        if let Some(region) = regions.get_mut(cache_id) {
            region.remove(key);
        }

        Ok(())
    }

    fn enumerate(&self, cache_id: &str) -> Result<Vec<CacheKey>, CacheError> {
        let regions = self
            .regions
            .read()
            .map_err(|err| CacheError::Poisoned(err.to_string()))?;

        Ok(regions
            .get(cache_id)
            .map(|region| region.keys().cloned().collect())
            .unwrap_or_default())
    }
}
