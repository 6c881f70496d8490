use crate::{
    db::query::{QueryError, SelectQuery},
    model::{EntityModel, FieldKind, FieldModel, FullTextModel},
    value::Value,
};
use std::{
    fmt,
    hash::{Hash, Hasher},
    ops::{BitAnd, BitOr, Not},
};

///
/// Expression model
///
/// Pure, dialect-agnostic representation of SQL value and condition trees.
/// Nodes carry no rendering behavior; the compiler owns all interpretation.
///

///
/// ColumnRef
///
/// (record type, field). Equality and hashing use the type path and field
/// name only, so two references built independently compare equal.
///

#[derive(Clone, Copy)]
pub struct ColumnRef {
    pub model: &'static EntityModel,
    pub field: &'static FieldModel,
}

impl ColumnRef {
    pub fn new(model: &'static EntityModel, field: &str) -> Result<Self, QueryError> {
        let field = model
            .field(field)
            .ok_or_else(|| QueryError::UnknownField {
                entity: model.path,
                field: field.to_string(),
            })?;

        Ok(Self { model, field })
    }

    /// Infallible variant for statically known field names.
    ///
    /// # Panics
    /// Panics if the model declares no such field.
    #[must_use]
    pub fn of(model: &'static EntityModel, field: &str) -> Self {
        match Self::new(model, field) {
            Ok(col) => col,
            Err(err) => panic!("{err}"),
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.field.name
    }

    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        self.field.kind
    }

    #[must_use]
    pub fn expr(self) -> Expr {
        Expr::Column(self)
    }

    #[must_use]
    pub fn eq(self, value: impl Into<Value>) -> Expr {
        Expr::binary(BinaryOp::Eq, self.expr(), Expr::Bind(value.into()))
    }

    #[must_use]
    pub fn ne(self, value: impl Into<Value>) -> Expr {
        Expr::binary(BinaryOp::Ne, self.expr(), Expr::Bind(value.into()))
    }

    #[must_use]
    pub fn lt(self, value: impl Into<Value>) -> Expr {
        Expr::binary(BinaryOp::Lt, self.expr(), Expr::Bind(value.into()))
    }

    #[must_use]
    pub fn le(self, value: impl Into<Value>) -> Expr {
        Expr::binary(BinaryOp::Le, self.expr(), Expr::Bind(value.into()))
    }

    #[must_use]
    pub fn gt(self, value: impl Into<Value>) -> Expr {
        Expr::binary(BinaryOp::Gt, self.expr(), Expr::Bind(value.into()))
    }

    #[must_use]
    pub fn ge(self, value: impl Into<Value>) -> Expr {
        Expr::binary(BinaryOp::Ge, self.expr(), Expr::Bind(value.into()))
    }

    #[must_use]
    pub fn like(self, pattern: impl Into<String>) -> Expr {
        Expr::binary(
            BinaryOp::Like,
            self.expr(),
            Expr::Bind(Value::Text(pattern.into())),
        )
    }

    #[must_use]
    pub fn in_(self, values: impl IntoIterator<Item = impl Into<Value>>) -> Expr {
        Expr::In {
            expr: Box::new(self.expr()),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn is_null(self) -> Expr {
        Expr::unary(UnaryOp::IsNull, self.expr())
    }

    #[must_use]
    pub fn is_not_null(self) -> Expr {
        Expr::unary(UnaryOp::IsNotNull, self.expr())
    }

    /// Equality that renders `IS NULL` for a null value.
    #[must_use]
    pub fn matches(self, value: &Value) -> Expr {
        if value.is_null() {
            self.is_null()
        } else {
            self.eq(value.clone())
        }
    }
}

impl PartialEq for ColumnRef {
    fn eq(&self, other: &Self) -> bool {
        self.model.path == other.model.path && self.field.name == other.field.name
    }
}

impl Eq for ColumnRef {}

impl Hash for ColumnRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.model.path.hash(state);
        self.field.name.hash(state);
    }
}

impl fmt::Debug for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.model.entity_name, self.field.name)
    }
}

///
/// UnaryOp
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnaryOp {
    Not,
    Neg,
    IsNull,
    IsNotNull,
}

///
/// BinaryOp
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
}

impl BinaryOp {
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Like => "LIKE",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::BitAnd => "&",
            Self::BitOr => "|",
        }
    }
}

///
/// NaryOp
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NaryOp {
    And,
    Or,
}

///
/// DatePart
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DatePart {
    Year,
    Month,
    DayOfMonth,
    DayOfWeek,
    DayOfYear,
    Hour,
    Minute,
    Second,
    Epoch,
}

///
/// Func
/// Scalar functions. Dialect-specific ones are delegated during rendering.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Func {
    Abs,
    Ceil,
    Floor,
    Round,
    Sign,
    Sqrt,
    Exp,
    Ln,
    Power,
    Lower,
    Upper,
    Length,
    Now,
    Trunc,
    DatePart(DatePart),
}

impl Func {
    /// SQL function name. Dialects render `Trunc` and `DatePart` themselves.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Abs => "abs",
            Self::Ceil => "ceil",
            Self::Floor => "floor",
            Self::Round => "round",
            Self::Sign => "sign",
            Self::Sqrt => "sqrt",
            Self::Exp => "exp",
            Self::Ln => "ln",
            Self::Power => "power",
            Self::Lower => "lower",
            Self::Upper => "upper",
            Self::Length => "length",
            Self::Now => "now",
            Self::Trunc => "trunc",
            Self::DatePart(_) => "extract",
        }
    }
}

///
/// AggregateFunc
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunc {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

///
/// ConditionalOp
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConditionalOp {
    Coalesce,
    Greatest,
    Least,
}

impl ConditionalOp {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Coalesce => "coalesce",
            Self::Greatest => "greatest",
            Self::Least => "least",
        }
    }
}

///
/// IntervalUnit
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IntervalUnit {
    Second,
    Minute,
    Hour,
    Day,
    Month,
    Year,
}

impl IntervalUnit {
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Second => "SECOND",
            Self::Minute => "MINUTE",
            Self::Hour => "HOUR",
            Self::Day => "DAY",
            Self::Month => "MONTH",
            Self::Year => "YEAR",
        }
    }
}

///
/// FullTextMode
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FullTextMode {
    /// Boolean predicate: the row matches the query.
    Match,
    /// Numeric relevance score, usable in projections and ORDER BY.
    Rank,
}

///
/// FullTextExpr
///

#[derive(Clone, Debug, PartialEq)]
pub struct FullTextExpr {
    pub model: &'static EntityModel,
    pub index: &'static FullTextModel,
    pub query: String,
    pub mode: FullTextMode,
}

impl FullTextExpr {
    /// Columns covered by the index, resolved against the owning model.
    #[must_use]
    pub fn columns(&self) -> Vec<ColumnRef> {
        self.index
            .fields
            .iter()
            .filter_map(|name| ColumnRef::new(self.model, name).ok())
            .collect()
    }
}

///
/// Expr
///

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Column(ColumnRef),
    /// Literal SQL text, rendered verbatim.
    Literal(String),
    /// Runtime value bound through a positional placeholder.
    Bind(Value),
    Unary {
        op: UnaryOp,
        expr: Box<Self>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Self>,
        rhs: Box<Self>,
    },
    Nary {
        op: NaryOp,
        args: Vec<Self>,
    },
    In {
        expr: Box<Self>,
        values: Vec<Value>,
    },
    Function {
        func: Func,
        args: Vec<Self>,
    },
    Aggregate {
        func: AggregateFunc,
        arg: Option<Box<Self>>,
        distinct: bool,
    },
    Case {
        whens: Vec<(Self, Self)>,
        otherwise: Option<Box<Self>>,
    },
    Conditional {
        op: ConditionalOp,
        args: Vec<Self>,
    },
    Interval {
        amount: i64,
        unit: IntervalUnit,
    },
    Random,
    Exists(Box<SelectQuery>),
    FullText(FullTextExpr),
}

impl Expr {
    #[must_use]
    pub fn literal(sql: impl Into<String>) -> Self {
        Self::Literal(sql.into())
    }

    #[must_use]
    pub fn bind(value: impl Into<Value>) -> Self {
        Self::Bind(value.into())
    }

    #[must_use]
    pub fn unary(op: UnaryOp, expr: Self) -> Self {
        Self::Unary {
            op,
            expr: Box::new(expr),
        }
    }

    #[must_use]
    pub fn binary(op: BinaryOp, lhs: Self, rhs: Self) -> Self {
        Self::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Conjunction; an empty list renders as a constant-true predicate.
    #[must_use]
    pub const fn and(args: Vec<Self>) -> Self {
        Self::Nary {
            op: NaryOp::And,
            args,
        }
    }

    /// Disjunction; an empty list renders as a constant-false predicate.
    #[must_use]
    pub const fn or(args: Vec<Self>) -> Self {
        Self::Nary {
            op: NaryOp::Or,
            args,
        }
    }

    #[must_use]
    pub const fn false_() -> Self {
        Self::or(Vec::new())
    }

    #[must_use]
    pub const fn func(func: Func, args: Vec<Self>) -> Self {
        Self::Function { func, args }
    }

    #[must_use]
    pub fn count_star() -> Self {
        Self::Aggregate {
            func: AggregateFunc::Count,
            arg: None,
            distinct: false,
        }
    }

    #[must_use]
    pub fn aggregate(func: AggregateFunc, arg: Self) -> Self {
        Self::Aggregate {
            func,
            arg: Some(Box::new(arg)),
            distinct: false,
        }
    }

    #[must_use]
    pub fn date_part(part: DatePart, arg: Self) -> Self {
        Self::func(Func::DatePart(part), vec![arg])
    }

    #[must_use]
    pub const fn coalesce(args: Vec<Self>) -> Self {
        Self::Conditional {
            op: ConditionalOp::Coalesce,
            args,
        }
    }

    #[must_use]
    pub fn exists(query: SelectQuery) -> Self {
        Self::Exists(Box::new(query))
    }

    /// Full-text expression against a named index of `model`.
    pub fn full_text(
        model: &'static EntityModel,
        index: &str,
        query: impl Into<String>,
        mode: FullTextMode,
    ) -> Result<Self, QueryError> {
        let index = model
            .full_text_index(index)
            .ok_or_else(|| QueryError::UnknownFullTextIndex {
                entity: model.path,
                index: index.to_string(),
            })?;

        Ok(Self::FullText(FullTextExpr {
            model,
            index,
            query: query.into(),
            mode,
        }))
    }

    /// Number of bound-value nodes, in the order the compiler visits them.
    #[must_use]
    pub fn bind_count(&self) -> usize {
        match self {
            Self::Bind(_) => 1,
            Self::Column(_)
            | Self::Literal(_)
            | Self::Interval { .. }
            | Self::Random
            | Self::FullText(_) => 0,
            Self::Unary { expr, .. } => expr.bind_count(),
            Self::Binary { lhs, rhs, .. } => lhs.bind_count() + rhs.bind_count(),
            Self::Nary { args, .. }
            | Self::Function { args, .. }
            | Self::Conditional { args, .. } => args.iter().map(Self::bind_count).sum(),
            Self::In { expr, values } => expr.bind_count() + values.len(),
            Self::Aggregate { arg, .. } => arg.as_ref().map_or(0, |a| a.bind_count()),
            Self::Case { whens, otherwise } => {
                whens
                    .iter()
                    .map(|(w, t)| w.bind_count() + t.bind_count())
                    .sum::<usize>()
                    + otherwise.as_ref().map_or(0, |o| o.bind_count())
            }
            Self::Exists(query) => query.bind_count(),
        }
    }
}

impl BitAnd for Expr {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self::and(vec![self, rhs])
    }
}

impl BitOr for Expr {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self::or(vec![self, rhs])
    }
}

impl Not for Expr {
    type Output = Self;

    fn not(self) -> Self::Output {
        Self::unary(UnaryOp::Not, self)
    }
}

impl From<ColumnRef> for Expr {
    fn from(col: ColumnRef) -> Self {
        Self::Column(col)
    }
}
