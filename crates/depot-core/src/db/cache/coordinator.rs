use crate::{
    db::cache::{CacheAdapter, CacheCategory, CacheError, CacheKey, CacheValue},
    key::{Key, KeySet},
    model::EntityModel,
    obs::sink::{self, MetricsEvent},
    traits::Record,
    value::Value,
};
use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};
use tracing::warn;

///
/// CacheListener
///
/// Observer of record-cache changes under one cache id. Listeners get the
/// coordinator back so they can cascade removals into derived caches.
///

pub trait CacheListener: Send + Sync {
    fn entry_stored(
        &self,
        coordinator: &CacheCoordinator,
        key: &CacheKey,
        old: Option<&CacheValue>,
        new: &CacheValue,
    );

    fn entry_removed(&self, coordinator: &CacheCoordinator, key: &CacheKey, old: Option<&CacheValue>);
}

///
/// CacheCoordinator
///
/// Mediates every cache access made by the executor. Adapter failures are
/// logged and reported as misses; the coordinator itself holds no entries
/// and never expires anything.
///

#[derive(Default)]
pub struct CacheCoordinator {
    adapter: Option<Arc<dyn CacheAdapter>>,
    listeners: RwLock<HashMap<String, Vec<Arc<dyn CacheListener>>>>,
}

impl CacheCoordinator {
    #[must_use]
    pub fn new(adapter: Arc<dyn CacheAdapter>) -> Self {
        Self {
            adapter: Some(adapter),
            listeners: RwLock::default(),
        }
    }

    /// Coordinator with no adapter; every lookup misses.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.adapter.is_some()
    }

    /// Cache id of a record type's keyset entries.
    #[must_use]
    pub fn keyset_cache_id(model: &EntityModel) -> String {
        format!("{}/keys", model.path)
    }

    /// Cache id of a record type's whole-result entries.
    #[must_use]
    pub fn contents_cache_id(model: &EntityModel) -> String {
        format!("{}/contents", model.path)
    }

    pub fn register_listener(&self, cache_id: impl Into<String>, listener: Arc<dyn CacheListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(cache_id.into())
            .or_default()
            .push(listener);
    }

    // Snapshot taken so no lock is held while listeners run.
    fn listeners_for(&self, cache_id: &str) -> Vec<Arc<dyn CacheListener>> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(cache_id)
            .cloned()
            .unwrap_or_default()
    }

    fn failed(cache_id: &str, op: &str, err: &CacheError) {
        warn!(cache_id, op, error = %err, "cache adapter failure treated as miss");
        sink::record(MetricsEvent::CacheFailure);
    }

    // Lookup without metrics, used to hand old values to listeners.
    fn peek(adapter: &dyn CacheAdapter, cache_id: &str, key: &CacheKey) -> Option<Arc<CacheValue>> {
        match adapter.lookup(cache_id, key) {
            Ok(found) => found,
            Err(err) => {
                Self::failed(cache_id, "lookup", &err);
                None
            }
        }
    }

    #[must_use]
    pub fn lookup(&self, cache_id: &str, key: &CacheKey) -> Option<Arc<CacheValue>> {
        let adapter = self.adapter.as_deref()?;

        match adapter.lookup(cache_id, key) {
            Ok(found) => {
                sink::record(MetricsEvent::CacheLookup {
                    hit: found.is_some(),
                });
                found
            }
            Err(err) => {
                Self::failed(cache_id, "lookup", &err);
                None
            }
        }
    }

    pub fn store(&self, category: CacheCategory, cache_id: &str, key: CacheKey, value: CacheValue) {
        let Some(adapter) = self.adapter.as_deref() else {
            return;
        };

        let listeners = if category == CacheCategory::Record {
            self.listeners_for(cache_id)
        } else {
            Vec::new()
        };
        let old = if listeners.is_empty() {
            None
        } else {
            Self::peek(adapter, cache_id, &key)
        };

        // the adapter takes ownership, listeners still need the new value
        let notify = (!listeners.is_empty()).then(|| (key.clone(), value.clone()));

        if let Err(err) = adapter.store(category, cache_id, key, value) {
            Self::failed(cache_id, "store", &err);
            return;
        }
        sink::record(MetricsEvent::CacheStore);

        if let Some((key, new)) = notify {
            for listener in &listeners {
                listener.entry_stored(self, &key, old.as_deref(), &new);
            }
        }
    }

    pub fn remove(&self, cache_id: &str, key: &CacheKey) {
        let Some(adapter) = self.adapter.as_deref() else {
            return;
        };

        let listeners = self.listeners_for(cache_id);
        let old = if listeners.is_empty() {
            None
        } else {
            Self::peek(adapter, cache_id, key)
        };

        if let Err(err) = adapter.remove(cache_id, key) {
            Self::failed(cache_id, "remove", &err);
            return;
        }
        sink::record(MetricsEvent::CacheRemove);

        for listener in &listeners {
            listener.entry_removed(self, key, old.as_deref());
        }
    }

    /// Remove every entry under `cache_id` whose key satisfies `filter`.
    /// Returns the number of entries removed.
    pub fn evict_matching(&self, cache_id: &str, filter: impl Fn(&CacheKey) -> bool) -> usize {
        let Some(adapter) = self.adapter.as_deref() else {
            return 0;
        };

        let keys = match adapter.enumerate(cache_id) {
            Ok(keys) => keys,
            Err(err) => {
                Self::failed(cache_id, "enumerate", &err);
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys.iter().filter(|k| filter(k)) {
            self.remove(cache_id, key);
            removed += 1;
        }

        removed
    }

    // record cache

    /// Cached record for `key`. Every hit materializes a fresh value.
    #[must_use]
    pub fn lookup_record<R: Record>(&self, key: &Key) -> Option<R> {
        let cached = self.lookup(R::MODEL.path, &key.cache_key())?;
        let CacheValue::Record(values) = cached.as_ref() else {
            warn!(entity = R::MODEL.path, "record cache entry has unexpected shape");
            return None;
        };

        match R::from_values(values.clone()) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(entity = R::MODEL.path, error = %err, "cached record failed to decode");
                None
            }
        }
    }

    /// Store a snapshot of `record` under `key`.
    pub fn store_record<R: Record>(&self, key: &Key, record: &R) {
        self.store_record_values(key, record.to_values());
    }

    pub fn store_record_values(&self, key: &Key, values: Vec<Value>) {
        if key.is_absent() {
            return;
        }

        self.store(
            CacheCategory::Record,
            key.model().path,
            key.cache_key(),
            CacheValue::Record(values),
        );
    }

    /// Remove the record entry for one key.
    pub fn invalidate(&self, key: &Key) {
        if key.is_absent() {
            return;
        }

        self.remove(key.model().path, &key.cache_key());
    }

    /// Remove the record entries for every key of a set.
    pub fn invalidate_set(&self, set: &KeySet) {
        for key in set.iter() {
            self.invalidate(&key);
        }
    }

    /// Remove every record entry of one type.
    pub fn invalidate_all(&self, model: &EntityModel) -> usize {
        self.evict_matching(model.path, |_| true)
    }
}

impl std::fmt::Debug for CacheCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheCoordinator")
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}
