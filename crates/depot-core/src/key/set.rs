use crate::{
    db::query::Expr,
    key::{Key, KeyError, key_columns, optimize::optimize},
    model::EntityModel,
    value::Value,
};
use std::collections::HashSet;

///
/// KeySetRepr
///
/// Chosen once at construction from the key arity and size.
///

#[derive(Clone, Debug, PartialEq)]
enum KeySetRepr {
    Empty,
    Single(Vec<Value>),
    Multi(Vec<Vec<Value>>),
}

///
/// KeySet
///
/// Distinct keys of one record type. Renders as a WHERE predicate, iterates
/// back into keys, and serves as a batch invalidation target.
///

#[derive(Clone, Debug, PartialEq)]
pub struct KeySet {
    model: &'static EntityModel,
    repr: KeySetRepr,
}

impl KeySet {
    #[must_use]
    pub const fn empty(model: &'static EntityModel) -> Self {
        Self {
            model,
            repr: KeySetRepr::Empty,
        }
    }

    /// Collect keys of `model`; duplicates are dropped, first occurrence wins.
    pub fn new(
        model: &'static EntityModel,
        keys: impl IntoIterator<Item = Key>,
    ) -> Result<Self, KeyError> {
        let mut seen = HashSet::new();
        let mut rows = Vec::new();
        for key in keys {
            if key.model() != model {
                return Err(KeyError::MixedTypes {
                    expected: model.path,
                    found: key.model().path,
                });
            }
            if seen.insert(key.clone()) {
                rows.push(key.into_values());
            }
        }

        Ok(Self::from_rows(model, rows))
    }

    // Rows are canonical key tuples, already distinct.
    fn from_rows(model: &'static EntityModel, rows: Vec<Vec<Value>>) -> Self {
        let repr = if rows.is_empty() {
            KeySetRepr::Empty
        } else if model.primary_key.len() == 1 {
            KeySetRepr::Single(rows.into_iter().filter_map(|mut r| r.pop()).collect())
        } else {
            KeySetRepr::Multi(rows)
        };

        Self { model, repr }
    }

    #[must_use]
    pub const fn model(&self) -> &'static EntityModel {
        self.model
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match &self.repr {
            KeySetRepr::Empty => 0,
            KeySetRepr::Single(values) => values.len(),
            KeySetRepr::Multi(rows) => rows.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn rows(&self) -> Vec<Vec<Value>> {
        match &self.repr {
            KeySetRepr::Empty => Vec::new(),
            KeySetRepr::Single(values) => values.iter().map(|v| vec![v.clone()]).collect(),
            KeySetRepr::Multi(rows) => rows.clone(),
        }
    }

    /// Keys in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<Key> {
        self.rows()
            .into_iter()
            .map(|values| Key {
                model: self.model,
                values,
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = Key> + '_ {
        self.keys().into_iter()
    }

    #[must_use]
    pub fn contains(&self, key: &Key) -> bool {
        if key.model() != self.model {
            return false;
        }
        match &self.repr {
            KeySetRepr::Empty => false,
            KeySetRepr::Single(values) => values.contains(&key.values()[0]),
            KeySetRepr::Multi(rows) => rows.iter().any(|r| r.as_slice() == key.values()),
        }
    }

    /// Split into sets of at most `max` keys (at least one key per set).
    #[must_use]
    pub fn chunks(&self, max: usize) -> Vec<Self> {
        self.rows()
            .chunks(max.max(1))
            .map(|chunk| Self::from_rows(self.model, chunk.to_vec()))
            .collect()
    }

    /// Predicate true for exactly the rows whose key is in this set.
    #[must_use]
    pub fn to_expr(&self) -> Expr {
        let columns = key_columns(self.model);
        match &self.repr {
            KeySetRepr::Empty => Expr::false_(),
            KeySetRepr::Single(values) => {
                let (nulls, values): (Vec<_>, Vec<_>) =
                    values.iter().cloned().partition(Value::is_null);
                let column = columns[0];
                let in_list = column.in_(values);
                if nulls.is_empty() {
                    in_list
                } else {
                    Expr::or(vec![in_list, column.is_null()])
                }
            }
            KeySetRepr::Multi(rows) => optimize(&columns, rows.clone()),
        }
    }
}

impl IntoIterator for KeySet {
    type Item = Key;
    type IntoIter = std::vec::IntoIter<Key>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys().into_iter()
    }
}
