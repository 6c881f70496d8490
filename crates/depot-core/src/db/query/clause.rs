use crate::{
    db::query::{Expr, QueryError},
    key::{Key, KeySet},
    model::EntityModel,
};
use derive_more::Display;

///
/// ClauseKind
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum ClauseKind {
    Where,
    Join,
    GroupBy,
    OrderBy,
    Limit,
    ForUpdate,
    Distinct,
    FieldDefinition,
    FieldOverride,
    FromOverride,
}

impl ClauseKind {
    /// Kinds that may appear more than once in one query.
    #[must_use]
    pub const fn repeatable(self) -> bool {
        matches!(self, Self::Join | Self::FieldDefinition | Self::FieldOverride)
    }
}

///
/// WhereClause
///
/// A filter expression, or a Key / KeySet acting as one. Keys keep their
/// identity so the cache coordinator can recognise point lookups.
///

#[derive(Clone, Debug, PartialEq)]
pub enum WhereClause {
    Expr(Expr),
    Key(Key),
    KeySet(KeySet),
}

impl WhereClause {
    #[must_use]
    pub const fn as_key(&self) -> Option<&Key> {
        match self {
            Self::Key(key) => Some(key),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_expr(&self) -> Expr {
        match self {
            Self::Expr(expr) => expr.clone(),
            Self::Key(key) => key.to_expr(),
            Self::KeySet(set) => set.to_expr(),
        }
    }
}

impl From<Expr> for WhereClause {
    fn from(expr: Expr) -> Self {
        Self::Expr(expr)
    }
}

impl From<Key> for WhereClause {
    fn from(key: Key) -> Self {
        Self::Key(key)
    }
}

impl From<KeySet> for WhereClause {
    fn from(set: KeySet) -> Self {
        Self::KeySet(set)
    }
}

///
/// JoinKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
}

impl JoinKind {
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT OUTER JOIN",
            Self::Right => "RIGHT OUTER JOIN",
        }
    }
}

///
/// Join
///

#[derive(Clone, Debug, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub model: &'static EntityModel,
    pub on: Expr,
}

///
/// Direction
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

///
/// NullsOrder
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NullsOrder {
    First,
    Last,
}

///
/// OrderTerm
///

#[derive(Clone, Debug, PartialEq)]
pub struct OrderTerm {
    pub expr: Expr,
    pub direction: Direction,
    pub nulls: Option<NullsOrder>,
}

impl OrderTerm {
    #[must_use]
    pub fn asc(expr: impl Into<Expr>) -> Self {
        Self {
            expr: expr.into(),
            direction: Direction::Asc,
            nulls: None,
        }
    }

    #[must_use]
    pub fn desc(expr: impl Into<Expr>) -> Self {
        Self {
            expr: expr.into(),
            direction: Direction::Desc,
            nulls: None,
        }
    }

    #[must_use]
    pub const fn nulls(mut self, nulls: NullsOrder) -> Self {
        self.nulls = Some(nulls);
        self
    }
}

///
/// Limit
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Limit {
    pub count: u32,
    pub offset: u32,
}

///
/// FieldDefinition
///
/// Per-query expression for one field of the selected record. Definitions
/// supply computed-record fields; overrides replace a stored column.
///

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDefinition {
    pub field: &'static str,
    pub expr: Expr,
}

///
/// Clause
///

#[derive(Clone, Debug, PartialEq)]
pub enum Clause {
    Where(WhereClause),
    Join(Join),
    GroupBy(Vec<Expr>),
    OrderBy(Vec<OrderTerm>),
    Limit(Limit),
    ForUpdate,
    /// Plain DISTINCT, or DISTINCT ON the given expressions.
    Distinct(Option<Vec<Expr>>),
    FieldDefinition(FieldDefinition),
    FieldOverride(FieldDefinition),
    FromOverride(Vec<&'static EntityModel>),
}

impl Clause {
    #[must_use]
    pub const fn kind(&self) -> ClauseKind {
        match self {
            Self::Where(_) => ClauseKind::Where,
            Self::Join(_) => ClauseKind::Join,
            Self::GroupBy(_) => ClauseKind::GroupBy,
            Self::OrderBy(_) => ClauseKind::OrderBy,
            Self::Limit(_) => ClauseKind::Limit,
            Self::ForUpdate => ClauseKind::ForUpdate,
            Self::Distinct(_) => ClauseKind::Distinct,
            Self::FieldDefinition(_) => ClauseKind::FieldDefinition,
            Self::FieldOverride(_) => ClauseKind::FieldOverride,
            Self::FromOverride(_) => ClauseKind::FromOverride,
        }
    }
}

///
/// QueryClauses
///
/// Ordered clause list, duplicate-free by kind except for the repeatable
/// kinds. Insertion order is preserved; rendering order is fixed by the
/// compiler regardless.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryClauses {
    clauses: Vec<Clause>,
}

impl QueryClauses {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            clauses: Vec::new(),
        }
    }

    pub fn push(&mut self, clause: Clause) -> Result<(), QueryError> {
        let kind = clause.kind();
        if !kind.repeatable() && self.clauses.iter().any(|c| c.kind() == kind) {
            return Err(QueryError::DuplicateClause(kind));
        }
        if let Clause::FieldDefinition(def) | Clause::FieldOverride(def) = &clause
            && self.definition(def.field).is_some()
        {
            return Err(QueryError::DuplicateFieldDefinition(def.field));
        }

        self.clauses.push(clause);
        Ok(())
    }

    pub fn try_from_iter(clauses: impl IntoIterator<Item = Clause>) -> Result<Self, QueryError> {
        let mut out = Self::new();
        for clause in clauses {
            out.push(clause)?;
        }

        Ok(out)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Clause> {
        self.clauses.iter()
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<ClauseKind> {
        self.clauses.iter().map(Clause::kind).collect()
    }

    #[must_use]
    pub fn where_clause(&self) -> Option<&WhereClause> {
        self.clauses.iter().find_map(|c| match c {
            Clause::Where(w) => Some(w),
            _ => None,
        })
    }

    pub fn joins(&self) -> impl Iterator<Item = &Join> {
        self.clauses.iter().filter_map(|c| match c {
            Clause::Join(j) => Some(j),
            _ => None,
        })
    }

    #[must_use]
    pub fn group_by(&self) -> Option<&[Expr]> {
        self.clauses.iter().find_map(|c| match c {
            Clause::GroupBy(g) => Some(g.as_slice()),
            _ => None,
        })
    }

    #[must_use]
    pub fn order_by(&self) -> Option<&[OrderTerm]> {
        self.clauses.iter().find_map(|c| match c {
            Clause::OrderBy(o) => Some(o.as_slice()),
            _ => None,
        })
    }

    #[must_use]
    pub fn limit(&self) -> Option<Limit> {
        self.clauses.iter().find_map(|c| match c {
            Clause::Limit(l) => Some(*l),
            _ => None,
        })
    }

    #[must_use]
    pub fn for_update(&self) -> bool {
        self.clauses.iter().any(|c| matches!(c, Clause::ForUpdate))
    }

    #[must_use]
    pub fn distinct(&self) -> Option<Option<&[Expr]>> {
        self.clauses.iter().find_map(|c| match c {
            Clause::Distinct(on) => Some(on.as_deref()),
            _ => None,
        })
    }

    #[must_use]
    pub fn from_override(&self) -> Option<&[&'static EntityModel]> {
        self.clauses.iter().find_map(|c| match c {
            Clause::FromOverride(models) => Some(models.as_slice()),
            _ => None,
        })
    }

    /// Definition or override registered for `field`, if any.
    #[must_use]
    pub fn definition(&self, field: &str) -> Option<&FieldDefinition> {
        self.clauses.iter().find_map(|c| match c {
            Clause::FieldDefinition(def) | Clause::FieldOverride(def) if def.field == field => {
                Some(def)
            }
            _ => None,
        })
    }

    #[must_use]
    pub fn has_field_overrides(&self) -> bool {
        self.clauses
            .iter()
            .any(|c| matches!(c, Clause::FieldDefinition(_) | Clause::FieldOverride(_)))
    }

    /// Copy of this list with the Where clause replaced and result shaping
    /// (order, limit, distinct, grouping) dropped.
    #[must_use]
    pub fn with_where_only(&self, where_clause: WhereClause) -> Self {
        let mut clauses: Vec<Clause> = self
            .clauses
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    Clause::FieldDefinition(_) | Clause::FieldOverride(_) | Clause::FromOverride(_)
                )
            })
            .cloned()
            .collect();
        clauses.push(Clause::Where(where_clause));

        Self { clauses }
    }
}
