//! Core runtime for depot: record models, keys, the query model and SQL
//! compiler, the cache coordinator, and fetch/modify execution, plus the
//! vocabulary exported via the `prelude`.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod config;
pub mod db;
pub mod error;
pub mod key;
pub mod model;
pub mod obs;
pub mod traits;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// Prelude
///
/// Domain vocabulary only. Errors, executors and adapters stay one module
/// level down.
///

pub mod prelude {
    pub use crate::{
        db::{
            DbSession, Depot,
            cache::CacheStrategy,
            query::{ColumnRef, Expr, OrderTerm, Query},
        },
        key::{Key, KeySet},
        model::{EntityModel, FieldKind, FieldModel},
        traits::Record,
        value::Value,
    };
}
