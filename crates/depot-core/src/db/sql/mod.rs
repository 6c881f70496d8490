//! SQL compilation: clause trees to parameterized SQL text plus an ordered
//! bind plan, with dialect-specific fragments delegated to a [`Dialect`].

mod bind;
mod compiler;
pub mod dialect;


pub use bind::BindOp;
pub use compiler::SqlCompiler;
pub use dialect::{
    Dialect, DialectKind, EmbeddedDialect, FailureKind, MySqlDialect, PostgresDialect,
};

use crate::{
    db::{
        connection::{Connection, DatabaseFailure, StatementHandle},
        query::{ClauseKind, SelectQuery, Statement},
    },
    error::{ErrorClass, ErrorOrigin, InternalError},
    value::Value,
};
use thiserror::Error as ThisError;

///
/// CompileError
///
/// Malformed or unsupported clause combinations. Always a programmer error;
/// never retried.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum CompileError {
    #[error("UPDATE of {entity} requires a WHERE clause")]
    UpdateWithoutWhere { entity: &'static str },

    #[error("UPDATE of {entity} sets no fields")]
    EmptyUpdate { entity: &'static str },

    #[error("DELETE from {entity} does not accept a {clause} clause")]
    UnsupportedDeleteClause {
        entity: &'static str,
        clause: ClauseKind,
    },

    #[error("{entity} is referenced by a nested query or join of the same type")]
    AmbiguousSelfReference { entity: &'static str },

    #[error("column {entity}.{field} is not in scope of this statement")]
    ColumnOutOfScope {
        entity: &'static str,
        field: &'static str,
    },

    #[error("{entity} has no table to {action}")]
    NoTable {
        entity: &'static str,
        action: &'static str,
    },

    #[error("computed field {entity}.{field} has no definition in this query")]
    UnresolvedComputedField {
        entity: &'static str,
        field: &'static str,
    },

    #[error("SELECT of {entity} projects no columns")]
    EmptyProjection { entity: &'static str },

    #[error("enum variant '{variant}' has no code to bind")]
    MissingEnumCode { variant: String },

    #[error("index '{name}' declares no columns")]
    EmptyIndex { name: String },

    #[error("{feature} is not supported by the {dialect} dialect")]
    Unsupported {
        dialect: DialectKind,
        feature: &'static str,
    },
}

impl From<CompileError> for InternalError {
    fn from(err: CompileError) -> Self {
        let class = match &err {
            CompileError::Unsupported { .. } => ErrorClass::Unsupported,
            _ => ErrorClass::InvariantViolation,
        };

        Self::new(class, ErrorOrigin::Compile, err.to_string())
    }
}

///
/// CompiledStatement
///
/// SQL text plus one bind operation per placeholder, in placeholder order.
/// `columns` names the record fields a row-returning statement projects, in
/// column order; it is empty for explicit-expression projections.
///

#[derive(Clone, Debug, PartialEq)]
pub struct CompiledStatement {
    pub sql: String,
    pub binds: Vec<BindOp>,
    pub columns: Vec<&'static str>,
}

impl CompiledStatement {
    /// Values exactly as they will be bound, in placeholder order.
    #[must_use]
    pub fn params(&self) -> Vec<Value> {
        self.binds.iter().map(BindOp::value).collect()
    }

    /// Apply every bind operation to a prepared statement.
    pub fn bind_all(
        &self,
        conn: &mut dyn Connection,
        handle: StatementHandle,
    ) -> Result<(), DatabaseFailure> {
        for (i, op) in self.binds.iter().enumerate() {
            op.apply(conn, handle, i + 1)?;
        }

        Ok(())
    }
}

/// Compile one statement against a dialect.
pub fn compile(
    statement: &Statement,
    dialect: &dyn Dialect,
) -> Result<CompiledStatement, CompileError> {
    let mut compiler = SqlCompiler::new(dialect);
    compiler.statement(statement)?;

    Ok(compiler.finish())
}

/// Compile a SELECT.
pub fn compile_select(
    query: &SelectQuery,
    dialect: &dyn Dialect,
) -> Result<CompiledStatement, CompileError> {
    let mut compiler = SqlCompiler::new(dialect);
    compiler.select(query)?;

    Ok(compiler.finish())
}
