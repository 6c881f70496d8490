use crate::{
    db::query::{Direction, Expr, QueryClauses, SelectQuery, WhereClause},
    model::{EntityModel, FieldModel},
    value::Value,
};

///
/// Statement
///
/// Everything the compiler can render. One statement compiles to exactly one
/// SQL string and bind list.
///

#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    Select(SelectQuery),
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
    CreateIndex(CreateIndexStatement),
    DropIndex(DropIndexStatement),
}

impl Statement {
    #[must_use]
    pub const fn model(&self) -> &'static EntityModel {
        match self {
            Self::Select(s) => s.model,
            Self::Insert(s) => s.model,
            Self::Update(s) => s.model,
            Self::Delete(s) => s.model,
            Self::CreateIndex(s) => s.model,
            Self::DropIndex(s) => s.model,
        }
    }
}

///
/// InsertStatement
///

#[derive(Clone, Debug, PartialEq)]
pub struct InsertStatement {
    pub model: &'static EntityModel,
    pub values: Vec<(&'static FieldModel, Value)>,
}

impl InsertStatement {
    /// Insert of a full record snapshot (`values` in model field order).
    /// Identity columns without an assigned value are left to the database.
    #[must_use]
    pub fn from_record_values(model: &'static EntityModel, values: Vec<Value>) -> Self {
        let values = model
            .fields
            .iter()
            .zip(values)
            .filter(|(field, value)| {
                field.computed.is_none()
                    && !(field.generated.is_some() && value.is_absent_key_part())
            })
            .collect();

        Self { model, values }
    }
}

///
/// UpdateStatement
///

#[derive(Clone, Debug, PartialEq)]
pub struct UpdateStatement {
    pub model: &'static EntityModel,
    pub sets: Vec<(&'static FieldModel, Expr)>,
    /// Required; an UPDATE without one is rejected at compile time.
    pub where_clause: Option<WhereClause>,
}

///
/// DeleteStatement
///
/// Only Where and Limit clauses are meaningful; anything else is rejected at
/// compile time.
///

#[derive(Clone, Debug, PartialEq)]
pub struct DeleteStatement {
    pub model: &'static EntityModel,
    pub clauses: QueryClauses,
}

///
/// IndexColumn
///

#[derive(Clone, Debug, PartialEq)]
pub struct IndexColumn {
    pub expr: Expr,
    pub direction: Direction,
}

///
/// CreateIndexStatement
///

#[derive(Clone, Debug, PartialEq)]
pub struct CreateIndexStatement {
    pub model: &'static EntityModel,
    pub name: String,
    pub unique: bool,
    pub columns: Vec<IndexColumn>,
}

///
/// DropIndexStatement
///

#[derive(Clone, Debug, PartialEq)]
pub struct DropIndexStatement {
    pub model: &'static EntityModel,
    pub name: String,
}
