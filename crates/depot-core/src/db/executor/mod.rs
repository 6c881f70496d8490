//! Fetch / modify execution: binds compiled statements to a connection,
//! classifies failures, retries a transient one once, and keeps the record
//! cache in step with every write.

mod context;
mod delete;
mod load;
mod save;
mod scope;

#[cfg(test)]
mod tests;

pub(crate) use context::{CacheAction, Context, classify_failure, row_key, row_values, surface};
pub(crate) use delete::DeleteExecutor;
pub(crate) use load::LoadExecutor;
pub(crate) use save::SaveExecutor;
pub(crate) use scope::ConnectionScope;

use crate::{
    error::InternalError,
    key::{Key, KeyError},
    model::EntityModel,
};

/// Reject a key or key set that belongs to another record type.
pub(crate) fn check_model(
    model: &'static EntityModel,
    found: &'static EntityModel,
) -> Result<(), InternalError> {
    if found != model {
        return Err(KeyError::MixedTypes {
            expected: model.path,
            found: found.path,
        }
        .into());
    }

    Ok(())
}

/// Reject a key that identifies no row yet.
pub(crate) fn check_key_present(key: &Key) -> Result<(), InternalError> {
    if key.is_absent() {
        return Err(InternalError::executor_invariant(format!(
            "{key:?} is absent and identifies no row"
        )));
    }

    Ok(())
}
