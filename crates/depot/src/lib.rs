//! ## Crate layout
//! - `core`: record models, keys, queries, the SQL compiler, caching and
//!   execution.
//!
//! The `prelude` module mirrors the surface application code uses day to day.

pub use depot_core as core;

pub use depot_core::{
    config::DepotConfig,
    db::{DbSession, Depot, Transaction},
    error::{ErrorClass, ErrorOrigin, InternalError as Error},
};

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

///
/// Prelude
///

pub mod prelude {
    pub use crate::core::{
        db,
        db::{
            DbSession, Depot, Transaction,
            cache::CacheStrategy,
            query::{self, ColumnRef, Expr, JoinKind, OrderTerm, Query},
        },
        key::{Key, KeySet},
        model::{EntityModel, FieldKind, FieldModel},
        traits::Record,
        value::Value,
    };
}
