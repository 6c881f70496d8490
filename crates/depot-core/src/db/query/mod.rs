//! Query description: expressions, clauses, statements, and the thin typed
//! builder that assembles them.

mod clause;
mod expr;
mod statement;


pub use clause::{
    Clause, ClauseKind, Direction, FieldDefinition, Join, JoinKind, Limit, NullsOrder, OrderTerm,
    QueryClauses, WhereClause,
};
pub use expr::{
    AggregateFunc, BinaryOp, ColumnRef, ConditionalOp, DatePart, Expr, FullTextExpr, FullTextMode,
    Func, IntervalUnit, NaryOp, UnaryOp,
};
pub use statement::{
    CreateIndexStatement, DeleteStatement, DropIndexStatement, IndexColumn, InsertStatement,
    Statement, UpdateStatement,
};

use crate::{
    db::cache::CacheStrategy,
    error::{ErrorClass, ErrorOrigin, InternalError},
    model::EntityModel,
    traits::Record,
};
use std::marker::PhantomData;
use thiserror::Error as ThisError;

///
/// QueryError
///
/// Construction-time failures of a clause tree.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum QueryError {
    #[error("duplicate {0} clause")]
    DuplicateClause(ClauseKind),

    #[error("field '{0}' is defined more than once")]
    DuplicateFieldDefinition(&'static str),

    #[error("unknown field '{field}' on {entity}")]
    UnknownField { entity: &'static str, field: String },

    #[error("unknown full-text index '{index}' on {entity}")]
    UnknownFullTextIndex { entity: &'static str, index: String },
}

impl From<QueryError> for InternalError {
    fn from(err: QueryError) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Query, err.to_string())
    }
}

///
/// Projection
///

#[derive(Clone, Debug, Default, PartialEq)]
pub enum Projection {
    /// Every field of the record, in model order.
    #[default]
    Record,
    /// Primary-key fields only, in declaration order.
    Keys,
    /// Explicit expressions (aggregates, counts).
    Exprs(Vec<Expr>),
}

///
/// SelectQuery
///
/// Untyped SELECT description: target record type, projection, clauses.
///

#[derive(Clone, Debug, PartialEq)]
pub struct SelectQuery {
    pub model: &'static EntityModel,
    pub projection: Projection,
    pub clauses: QueryClauses,
}

impl SelectQuery {
    #[must_use]
    pub fn new(model: &'static EntityModel) -> Self {
        Self {
            model,
            projection: Projection::Record,
            clauses: QueryClauses::new(),
        }
    }

    #[must_use]
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_clause(mut self, clause: Clause) -> Result<Self, QueryError> {
        self.clauses.push(clause)?;
        Ok(self)
    }

    /// Keys-only variant sharing filter, joins, ordering and definitions.
    #[must_use]
    pub fn keys_only(&self) -> Self {
        Self {
            model: self.model,
            projection: Projection::Keys,
            clauses: self.clauses.clone(),
        }
    }

    /// Number of bound values the compiled form carries when no field
    /// definition is referenced outside the projection.
    #[must_use]
    pub fn bind_count(&self) -> usize {
        let definition = |field: &str| {
            self.clauses
                .definition(field)
                .map_or(0, |d| d.expr.bind_count())
        };
        let projection: usize = match &self.projection {
            Projection::Exprs(exprs) => exprs.iter().map(Expr::bind_count).sum(),
            Projection::Record => self.model.fields.iter().map(|f| definition(f.name)).sum(),
            Projection::Keys => self.model.primary_key.iter().map(|f| definition(f)).sum(),
        };

        let body: usize = self
            .clauses
            .iter()
            .map(|c| match c {
                Clause::Where(w) => w.to_expr().bind_count(),
                Clause::Join(j) => j.on.bind_count(),
                Clause::GroupBy(g) => g.iter().map(Expr::bind_count).sum(),
                Clause::OrderBy(o) => o.iter().map(|t| t.expr.bind_count()).sum(),
                Clause::Distinct(Some(on)) => on.iter().map(Expr::bind_count).sum(),
                _ => 0,
            })
            .sum();

        projection + body
    }
}

///
/// Query
///
/// Typed builder over [`SelectQuery`]. Builder calls never fail; the first
/// construction error is kept and reported when the query is executed.
///

#[derive(Clone, Debug)]
pub struct Query<R: Record> {
    inner: SelectQuery,
    strategy: Option<CacheStrategy>,
    error: Option<QueryError>,
    _marker: PhantomData<R>,
}

impl<R: Record> Default for Query<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> Query<R> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: SelectQuery::new(R::MODEL),
            strategy: None,
            error: None,
            _marker: PhantomData,
        }
    }

    fn clause(mut self, clause: Clause) -> Self {
        if self.error.is_none()
            && let Err(err) = self.inner.clauses.push(clause)
        {
            self.error = Some(err);
        }
        self
    }

    #[must_use]
    pub fn filter(self, where_clause: impl Into<WhereClause>) -> Self {
        self.clause(Clause::Where(where_clause.into()))
    }

    #[must_use]
    pub fn join(self, kind: JoinKind, model: &'static EntityModel, on: Expr) -> Self {
        self.clause(Clause::Join(Join { kind, model, on }))
    }

    #[must_use]
    pub fn group_by(self, exprs: Vec<Expr>) -> Self {
        self.clause(Clause::GroupBy(exprs))
    }

    #[must_use]
    pub fn order_by(self, terms: Vec<OrderTerm>) -> Self {
        self.clause(Clause::OrderBy(terms))
    }

    #[must_use]
    pub fn limit(self, count: u32) -> Self {
        self.clause(Clause::Limit(Limit { count, offset: 0 }))
    }

    #[must_use]
    pub fn page(self, count: u32, offset: u32) -> Self {
        self.clause(Clause::Limit(Limit { count, offset }))
    }

    #[must_use]
    pub fn for_update(self) -> Self {
        self.clause(Clause::ForUpdate)
    }

    #[must_use]
    pub fn distinct(self) -> Self {
        self.clause(Clause::Distinct(None))
    }

    #[must_use]
    pub fn distinct_on(self, exprs: Vec<Expr>) -> Self {
        self.clause(Clause::Distinct(Some(exprs)))
    }

    #[must_use]
    pub fn define_field(self, field: &'static str, expr: Expr) -> Self {
        self.clause(Clause::FieldDefinition(FieldDefinition { field, expr }))
    }

    #[must_use]
    pub fn override_field(self, field: &'static str, expr: Expr) -> Self {
        self.clause(Clause::FieldOverride(FieldDefinition { field, expr }))
    }

    #[must_use]
    pub fn from_override(self, models: Vec<&'static EntityModel>) -> Self {
        self.clause(Clause::FromOverride(models))
    }

    #[must_use]
    pub const fn cache(mut self, strategy: CacheStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    #[must_use]
    pub const fn strategy(&self) -> Option<CacheStrategy> {
        self.strategy
    }

    /// Validated clause tree.
    pub fn build(&self) -> Result<&SelectQuery, QueryError> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(&self.inner),
        }
    }
}
