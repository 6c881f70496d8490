use crate::db::{cache::CacheCategory, query::SelectQuery};
use derive_more::Display;
use serde::{Deserialize, Serialize};

///
/// CacheStrategy
///
/// How a collection query uses the cache.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Display, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStrategy {
    /// Always hit the database.
    None,
    /// `ShortKeys` when the query shape allows it, else `None`.
    #[default]
    Best,
    /// Keys from the database, records from the cache where possible.
    Records,
    /// As `Records`, with the key list cached for a short period.
    ShortKeys,
    /// As `Records`, with the key list cached for a long period.
    LongKeys,
    /// Whole result list cached under the query text.
    Contents,
}

impl CacheStrategy {
    /// Replace `Best` with the concrete strategy for this query.
    #[must_use]
    pub fn resolve(self, query: &SelectQuery) -> Self {
        match self {
            Self::Best => {
                let model = query.model;
                if model.has_primary_key()
                    && !model.is_computed()
                    && !query.clauses.has_field_overrides()
                {
                    Self::ShortKeys
                } else {
                    Self::None
                }
            }
            other => other,
        }
    }

    /// True for the two-phase (keys, then records) strategies.
    #[must_use]
    pub const fn is_two_phase(self) -> bool {
        matches!(self, Self::Records | Self::ShortKeys | Self::LongKeys)
    }

    /// Category under which the key list is cached, if it is cached at all.
    #[must_use]
    pub const fn keyset_category(self) -> Option<CacheCategory> {
        match self {
            Self::ShortKeys => Some(CacheCategory::ShortKeyset),
            Self::LongKeys => Some(CacheCategory::LongKeyset),
            _ => None,
        }
    }
}
