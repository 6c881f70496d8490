//! Per-database rendering rules.
//!
//! The compiler owns structure; a dialect owns only the fragments that
//! differ between products. Hooks that need nested rendering receive the
//! compiler and call back into it, so bind order is never the dialect's
//! concern.

mod embedded;
mod mysql;
mod postgres;

pub use embedded::EmbeddedDialect;
pub use mysql::MySqlDialect;
pub use postgres::PostgresDialect;

use crate::{
    db::{
        connection::DatabaseFailure,
        query::{DatePart, DropIndexStatement, Expr, FullTextExpr, FullTextMode, IntervalUnit},
        sql::{CompileError, SqlCompiler},
    },
    value::Value,
};
use derive_more::Display;
use serde::{Deserialize, Serialize};

///
/// DialectKind
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Display, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DialectKind {
    #[default]
    #[display("embedded")]
    Embedded,
    #[display("postgres")]
    Postgres,
    #[serde(rename = "mysql")]
    #[display("mysql")]
    MySql,
}

static EMBEDDED: EmbeddedDialect = EmbeddedDialect;
static POSTGRES: PostgresDialect = PostgresDialect;
static MYSQL: MySqlDialect = MySqlDialect;

impl DialectKind {
    #[must_use]
    pub fn dialect(self) -> &'static dyn Dialect {
        match self {
            Self::Embedded => &EMBEDDED,
            Self::Postgres => &POSTGRES,
            Self::MySql => &MYSQL,
        }
    }
}

///
/// FailureKind
///
/// Dialect verdict on a database failure; drives the retry decision.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureKind {
    Transient,
    DuplicateKey,
    Other,
}

///
/// Dialect
///
/// Override points every dialect answers. Defaults are the ANSI rendering.
///

pub trait Dialect: Send + Sync {
    fn kind(&self) -> DialectKind;

    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Constant predicate, used for empty conjunctions and disjunctions.
    fn bool_literal(&self, value: bool) -> &'static str {
        if value { "1=1" } else { "1=0" }
    }

    /// Largest number of keys one batched fetch may carry.
    fn max_in_keys(&self) -> usize;

    /// Arrays bind as one native parameter rather than a packed blob.
    fn native_arrays(&self) -> bool {
        false
    }

    fn supports_nulls_ordering(&self) -> bool {
        true
    }

    fn supports_distinct_on(&self) -> bool {
        false
    }

    fn supports_delete_limit(&self) -> bool {
        false
    }

    fn supports_expression_indexes(&self) -> bool {
        true
    }

    /// Tail of an INSERT that supplies no columns.
    fn empty_insert_values(&self) -> &'static str {
        " DEFAULT VALUES"
    }

    fn random_function(&self) -> &'static str {
        "random()"
    }

    /// `expr IN (?, ?, ...)`; `values` is never empty.
    fn render_in(
        &self,
        c: &mut SqlCompiler<'_>,
        expr: &Expr,
        values: &[Value],
    ) -> Result<(), CompileError> {
        let hint = SqlCompiler::kind_of(expr);
        c.render_expr(expr)?;
        c.push_sql(" IN (");
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                c.push_sql(", ");
            }
            c.push_bind_hinted(value, hint)?;
        }
        c.push_sql(")");

        Ok(())
    }

    fn date_part_name(&self, part: DatePart) -> &'static str {
        match part {
            DatePart::Year => "YEAR",
            DatePart::Month => "MONTH",
            DatePart::DayOfMonth => "DAY",
            DatePart::DayOfWeek => "DOW",
            DatePart::DayOfYear => "DOY",
            DatePart::Hour => "HOUR",
            DatePart::Minute => "MINUTE",
            DatePart::Second => "SECOND",
            DatePart::Epoch => "EPOCH",
        }
    }

    fn render_date_part(
        &self,
        c: &mut SqlCompiler<'_>,
        part: DatePart,
        arg: &Expr,
    ) -> Result<(), CompileError> {
        c.push_sql("EXTRACT(");
        c.push_sql(self.date_part_name(part));
        c.push_sql(" FROM ");
        c.render_expr(arg)?;
        c.push_sql(")");

        Ok(())
    }

    fn render_trunc(&self, c: &mut SqlCompiler<'_>, args: &[Expr]) -> Result<(), CompileError> {
        c.push_sql("trunc(");
        c.push_list(args, ", ")?;
        c.push_sql(")");

        Ok(())
    }

    fn render_interval(&self, c: &mut SqlCompiler<'_>, amount: i64, unit: IntervalUnit) {
        c.push_sql(&format!("INTERVAL '{amount}' {}", unit.keyword()));
    }

    fn render_limit(&self, c: &mut SqlCompiler<'_>, count: u32, offset: u32) {
        c.push_sql(&format!(" LIMIT {count}"));
        if offset > 0 {
            c.push_sql(&format!(" OFFSET {offset}"));
        }
    }

    fn render_full_text(
        &self,
        c: &mut SqlCompiler<'_>,
        ft: &FullTextExpr,
    ) -> Result<(), CompileError>;

    fn render_drop_index(
        &self,
        c: &mut SqlCompiler<'_>,
        stmt: &DropIndexStatement,
    ) -> Result<(), CompileError> {
        c.push_sql("DROP INDEX ");
        c.push_ident(&stmt.name);

        Ok(())
    }

    /// Engine-managed column, hidden from schema introspection.
    fn is_private_column(&self, name: &str) -> bool;

    /// Engine-managed index, hidden from schema introspection.
    fn is_private_index(&self, name: &str) -> bool;

    fn classify(&self, failure: &DatabaseFailure) -> FailureKind {
        classify_sql_state(failure)
    }
}

/// Classification from the SQLSTATE alone.
#[must_use]
pub fn classify_sql_state(failure: &DatabaseFailure) -> FailureKind {
    match failure.sql_state.as_deref() {
        Some("23505") => FailureKind::DuplicateKey,
        Some("40001" | "40P01" | "57P01" | "HYT00") => FailureKind::Transient,
        _ => match failure.sql_state_class() {
            // connection exceptions, insufficient resources
            Some("08" | "53") => FailureKind::Transient,
            _ => FailureKind::Other,
        },
    }
}

/// Shared LIKE-based full-text fallback: a row matches when any indexed
/// column contains the query text, case-insensitively; rank counts matching
/// columns.
pub(crate) fn render_like_full_text(
    c: &mut SqlCompiler<'_>,
    ft: &FullTextExpr,
) -> Result<(), CompileError> {
    let pattern = Value::Text(format!("%{}%", ft.query.to_lowercase()));
    let columns = ft.columns();

    c.push_sql("(");
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            c.push_sql(match ft.mode {
                FullTextMode::Match => " OR ",
                FullTextMode::Rank => " + ",
            });
        }
        if ft.mode == FullTextMode::Rank {
            c.push_sql("CASE WHEN ");
        }
        c.push_sql("lower(");
        c.render_column(*column)?;
        c.push_sql(") LIKE ");
        c.push_bind_hinted(&pattern, None)?;
        if ft.mode == FullTextMode::Rank {
            c.push_sql(" THEN 1 ELSE 0 END");
        }
    }
    c.push_sql(")");

    Ok(())
}
