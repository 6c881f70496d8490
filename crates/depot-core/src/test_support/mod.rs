pub(crate) mod scripted;

pub(crate) use scripted::{Reply, ScriptedDatabase};

use crate::{
    config::DepotConfig,
    db::{Depot, cache::MemoryCache},
    error::InternalError,
    model::{ComputedField, EntityModel, FieldKind, FieldModel},
    traits::Record,
    value::{Value, ValueEnum},
};
use std::sync::Arc;

/// Build a runtime field model for test records.
#[must_use]
pub(crate) const fn field(name: &'static str, kind: FieldKind) -> FieldModel {
    FieldModel::new(name, kind)
}

fn int(value: &Value) -> i64 {
    value.as_int().unwrap_or(0)
}

fn text(value: &Value) -> String {
    match value {
        Value::Text(s) => s.clone(),
        Value::Enum(e) => e.variant.clone(),
        _ => String::new(),
    }
}

fn shape_error(model: &EntityModel, found: usize) -> InternalError {
    InternalError::model_invariant(format!(
        "{}: expected {} values, got {found}",
        model.path,
        model.fields.len()
    ))
}

/// Depot over a scripted database with an in-memory cache.
pub(crate) fn cached_depot(db: &ScriptedDatabase, config: DepotConfig) -> Depot {
    Depot::new(Arc::new(db.clone()), config)
        .expect("valid config")
        .with_cache(Arc::new(MemoryCache::new()))
}

///
/// Person
/// Single identity key.
///

pub(crate) static PERSON_FIELDS: [FieldModel; 3] = [
    field("id", FieldKind::Int).identity(),
    field("name", FieldKind::Text),
    field("age", FieldKind::Int),
];

pub(crate) static PERSON: EntityModel = EntityModel::stored(
    "test_support::Person",
    "Person",
    "person",
    &PERSON_FIELDS,
    &["id"],
);

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct Person {
    pub(crate) id: i64,
    pub(crate) name: String,
    pub(crate) age: i64,
}

impl Person {
    pub(crate) fn new(id: i64, name: &str, age: i64) -> Self {
        Self {
            id,
            name: name.to_string(),
            age,
        }
    }

    /// Row exactly as the record projection returns it.
    pub(crate) fn row(&self) -> Vec<Value> {
        self.to_values()
    }
}

impl Record for Person {
    const MODEL: &'static EntityModel = &PERSON;

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Int(self.id),
            Value::Text(self.name.clone()),
            Value::Int(self.age),
        ]
    }

    fn from_values(values: Vec<Value>) -> Result<Self, InternalError> {
        let [id, name, age]: [Value; 3] = values
            .try_into()
            .map_err(|v: Vec<Value>| shape_error(&PERSON, v.len()))?;

        Ok(Self {
            id: int(&id),
            name: text(&name),
            age: int(&age),
        })
    }

    fn set_value(&mut self, field: &str, value: Value) -> Result<(), InternalError> {
        match field {
            "id" => self.id = int(&value),
            "name" => self.name = text(&value),
            "age" => self.age = int(&value),
            other => {
                return Err(InternalError::model_invariant(format!(
                    "Person has no field '{other}'"
                )));
            }
        }

        Ok(())
    }
}

///
/// Membership
/// Composite key, enum stored by name.
///

pub(crate) static MEMBERSHIP_FIELDS: [FieldModel; 3] = [
    field("org_id", FieldKind::Int),
    field("user_id", FieldKind::Int),
    field("role", FieldKind::EnumName),
];

pub(crate) static MEMBERSHIP: EntityModel = EntityModel::stored(
    "test_support::Membership",
    "Membership",
    "membership",
    &MEMBERSHIP_FIELDS,
    &["org_id", "user_id"],
);

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Membership {
    pub(crate) org_id: i64,
    pub(crate) user_id: i64,
    pub(crate) role: String,
}

impl Membership {
    pub(crate) fn new(org_id: i64, user_id: i64, role: &str) -> Self {
        Self {
            org_id,
            user_id,
            role: role.to_string(),
        }
    }

    pub(crate) fn row(&self) -> Vec<Value> {
        vec![
            Value::Int(self.org_id),
            Value::Int(self.user_id),
            Value::Text(self.role.clone()),
        ]
    }
}

impl Record for Membership {
    const MODEL: &'static EntityModel = &MEMBERSHIP;

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Int(self.org_id),
            Value::Int(self.user_id),
            Value::Enum(ValueEnum::named(self.role.clone())),
        ]
    }

    fn from_values(values: Vec<Value>) -> Result<Self, InternalError> {
        let [org_id, user_id, role]: [Value; 3] = values
            .try_into()
            .map_err(|v: Vec<Value>| shape_error(&MEMBERSHIP, v.len()))?;

        Ok(Self {
            org_id: int(&org_id),
            user_id: int(&user_id),
            role: text(&role),
        })
    }

    fn set_value(&mut self, field: &str, value: Value) -> Result<(), InternalError> {
        match field {
            "org_id" => self.org_id = int(&value),
            "user_id" => self.user_id = int(&value),
            "role" => self.role = text(&value),
            other => {
                return Err(InternalError::model_invariant(format!(
                    "Membership has no field '{other}'"
                )));
            }
        }

        Ok(())
    }
}

///
/// PersonSummary
/// Computed record over the person table: one literal column, one optional
/// column that only a query definition can supply.
///

pub(crate) static PERSON_SUMMARY_FIELDS: [FieldModel; 4] = [
    field("id", FieldKind::Int),
    field("name", FieldKind::Text),
    field("name_length", FieldKind::Int).computed(ComputedField {
        sql: Some("length(name)"),
        optional: false,
    }),
    field("score", FieldKind::Int).computed(ComputedField {
        sql: None,
        optional: true,
    }),
];

pub(crate) static PERSON_SUMMARY: EntityModel = EntityModel {
    path: "test_support::PersonSummary",
    entity_name: "PersonSummary",
    table: None,
    fields: &PERSON_SUMMARY_FIELDS,
    primary_key: &["id"],
    full_text: &[],
    shadow: Some(&PERSON),
};

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct PersonSummary {
    pub(crate) id: i64,
    pub(crate) name: String,
    pub(crate) name_length: i64,
    pub(crate) score: Option<i64>,
}

impl Record for PersonSummary {
    const MODEL: &'static EntityModel = &PERSON_SUMMARY;

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Int(self.id),
            Value::Text(self.name.clone()),
            Value::Int(self.name_length),
            Value::from(self.score),
        ]
    }

    fn from_values(values: Vec<Value>) -> Result<Self, InternalError> {
        let [id, name, name_length, score]: [Value; 4] = values
            .try_into()
            .map_err(|v: Vec<Value>| shape_error(&PERSON_SUMMARY, v.len()))?;

        Ok(Self {
            id: int(&id),
            name: text(&name),
            name_length: int(&name_length),
            score: score.as_int(),
        })
    }

    fn set_value(&mut self, field: &str, value: Value) -> Result<(), InternalError> {
        match field {
            "id" => self.id = int(&value),
            "name" => self.name = text(&value),
            "name_length" => self.name_length = int(&value),
            "score" => self.score = value.as_int(),
            other => {
                return Err(InternalError::model_invariant(format!(
                    "PersonSummary has no field '{other}'"
                )));
            }
        }

        Ok(())
    }
}
