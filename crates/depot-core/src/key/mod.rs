mod optimize;
mod set;


pub use optimize::{MODE_THRESHOLD, optimize};
pub use set::KeySet;

use crate::{
    db::{
        cache::CacheKey,
        query::{ColumnRef, Expr},
    },
    error::{ErrorClass, ErrorOrigin, InternalError},
    model::EntityModel,
    traits::Record,
    value::Value,
};
use std::{
    fmt,
    hash::{Hash, Hasher},
};
use thiserror::Error as ThisError;

///
/// KeyError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum KeyError {
    #[error("{entity} declares no primary key")]
    NoPrimaryKey { entity: &'static str },

    #[error("'{field}' is not a primary key field of {entity}")]
    NotKeyField { entity: &'static str, field: String },

    #[error("primary key field '{field}' of {entity} supplied more than once")]
    DuplicateField { entity: &'static str, field: String },

    #[error("primary key field '{field}' of {entity} is missing")]
    MissingField { entity: &'static str, field: &'static str },

    #[error("{entity} key expects {expected} values, got {found}")]
    Arity {
        entity: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{entity} key is partially null: {values:?}")]
    PartiallyNull {
        entity: &'static str,
        values: Vec<Value>,
    },

    #[error("key set for {expected} cannot hold a key of {found}")]
    MixedTypes {
        expected: &'static str,
        found: &'static str,
    },
}

impl From<KeyError> for InternalError {
    fn from(err: KeyError) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Key, err.to_string())
    }
}

///
/// Key
///
/// Canonical primary-key tuple for one row. Values are always held in the
/// model's declaration order, whatever order the caller supplied them in.
/// A key is either fully present or fully absent, never partially null.
///

#[derive(Clone)]
pub struct Key {
    model: &'static EntityModel,
    values: Vec<Value>,
}

impl Key {
    /// Build a key from (field, value) pairs in any order.
    pub fn new<'a>(
        model: &'static EntityModel,
        pairs: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> Result<Self, KeyError> {
        if !model.has_primary_key() {
            return Err(KeyError::NoPrimaryKey { entity: model.path });
        }

        let mut slots: Vec<Option<Value>> = vec![None; model.primary_key.len()];
        for (field, value) in pairs {
            let pos = model
                .primary_key
                .iter()
                .position(|pk| *pk == field)
                .ok_or_else(|| KeyError::NotKeyField {
                    entity: model.path,
                    field: field.to_string(),
                })?;
            if slots[pos].replace(value).is_some() {
                return Err(KeyError::DuplicateField {
                    entity: model.path,
                    field: field.to_string(),
                });
            }
        }

        let values = slots
            .into_iter()
            .zip(model.primary_key.iter().copied())
            .map(|(slot, field)| {
                slot.ok_or(KeyError::MissingField {
                    entity: model.path,
                    field,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_values(model, values)
    }

    /// Build a key from values already in declaration order.
    pub fn from_values(model: &'static EntityModel, values: Vec<Value>) -> Result<Self, KeyError> {
        if !model.has_primary_key() {
            return Err(KeyError::NoPrimaryKey { entity: model.path });
        }
        if values.len() != model.primary_key.len() {
            return Err(KeyError::Arity {
                entity: model.path,
                expected: model.primary_key.len(),
                found: values.len(),
            });
        }

        let absent = values.iter().filter(|v| v.is_absent_key_part()).count();
        if absent != 0 && absent != values.len() {
            return Err(KeyError::PartiallyNull {
                entity: model.path,
                values,
            });
        }

        Ok(Self { model, values })
    }

    /// Extract the key of a record.
    pub fn of<R: Record>(record: &R) -> Result<Self, KeyError> {
        Self::from_record_values(R::MODEL, &record.to_values())
    }

    /// Extract the key from a full record snapshot (model field order).
    pub fn from_record_values(
        model: &'static EntityModel,
        values: &[Value],
    ) -> Result<Self, KeyError> {
        let key_values = model
            .primary_key_indexes()
            .into_iter()
            .map(|i| values.get(i).cloned().unwrap_or(Value::Null))
            .collect();

        Self::from_values(model, key_values)
    }

    #[must_use]
    pub const fn model(&self) -> &'static EntityModel {
        self.model
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// True when the key identifies nothing yet (unassigned identity).
    #[must_use]
    pub fn is_absent(&self) -> bool {
        self.values.iter().all(Value::is_absent_key_part)
    }

    /// Column references of the key, in declaration order.
    #[must_use]
    pub fn columns(&self) -> Vec<ColumnRef> {
        key_columns(self.model)
    }

    /// AND of per-column equality; null values render as `IS NULL`.
    #[must_use]
    pub fn to_expr(&self) -> Expr {
        let mut terms: Vec<Expr> = self
            .columns()
            .into_iter()
            .zip(&self.values)
            .map(|(col, value)| col.matches(value))
            .collect();

        if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::and(terms)
        }
    }

    #[must_use]
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::Record {
            entity: self.model.path.to_string(),
            values: self.values.clone(),
        }
    }
}

/// Column references for a model's primary key.
pub(crate) fn key_columns(model: &'static EntityModel) -> Vec<ColumnRef> {
    model
        .primary_key
        .iter()
        .filter_map(|name| ColumnRef::new(model, name).ok())
        .collect()
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.model.path == other.model.path && self.values == other.values
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.model.path.hash(state);
        self.values.hash(state);
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({}", self.model.entity_name)?;
        for (name, value) in self.model.primary_key.iter().zip(&self.values) {
            write!(f, ", {name}={value}")?;
        }
        write!(f, ")")
    }
}
