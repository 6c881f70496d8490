//! Cache boundary: entry identities, the adapter contract, strategies, and
//! the coordinator that keeps record caches consistent with mutations.

mod coordinator;
mod memory;
mod strategy;

#[cfg(test)]
mod tests;

pub use coordinator::{CacheCoordinator, CacheListener};
pub use memory::MemoryCache;
pub use strategy::CacheStrategy;

use crate::{
    error::{ErrorClass, ErrorOrigin, InternalError},
    value::Value,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error as ThisError;

///
/// CacheError
///
/// Adapter-side failure. The coordinator logs these and treats them as a
/// miss; they never abort a database operation.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum CacheError {
    #[error("cache backend failure: {0}")]
    Backend(String),

    #[error("cache lock poisoned: {0}")]
    Poisoned(String),
}

impl From<CacheError> for InternalError {
    fn from(err: CacheError) -> Self {
        Self::new(ErrorClass::Internal, ErrorOrigin::Cache, err.to_string())
    }
}

///
/// CacheCategory
///
/// Lifetime/consistency class of an entry. Only `Record` entries are kept
/// consistent by invalidation; the others are accepted as stale until the
/// adapter expires them.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum CacheCategory {
    Record,
    ShortKeyset,
    LongKeyset,
    Result,
}

///
/// CacheKey
///
/// Opaque entry identity made only of primitive data.
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum CacheKey {
    /// One row, by canonical primary key.
    Record { entity: String, values: Vec<Value> },
    /// A collection, by compiled SQL text plus the values bound into it.
    Query { sql: String, params: Vec<Value> },
}

///
/// CacheValue
///
/// Immutable snapshot held by the adapter. Records are stored as field value
/// vectors, so every read materializes a fresh record.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum CacheValue {
    Record(Vec<Value>),
    Keys(Vec<Vec<Value>>),
    Records(Vec<Vec<Value>>),
}

///
/// CacheAdapter
///
/// Shared external cache. Implementations must tolerate arbitrary
/// concurrent callers; the coordinator never holds a lock across a call.
///

pub trait CacheAdapter: Send + Sync {
    fn lookup(&self, cache_id: &str, key: &CacheKey) -> Result<Option<Arc<CacheValue>>, CacheError>;

    fn store(
        &self,
        category: CacheCategory,
        cache_id: &str,
        key: CacheKey,
        value: CacheValue,
    ) -> Result<(), CacheError>;

    fn remove(&self, cache_id: &str, key: &CacheKey) -> Result<(), CacheError>;

    /// Keys currently held under `cache_id`, for bulk eviction.
    fn enumerate(&self, cache_id: &str) -> Result<Vec<CacheKey>, CacheError>;
}
