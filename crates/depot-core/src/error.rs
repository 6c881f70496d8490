use crate::db::connection::DatabaseFailure;
use std::fmt;
use thiserror::Error as ThisError;

///
/// InternalError
///
/// Structured runtime error with a stable classification.
/// Every public operation either succeeds or returns one of these; there is
/// no partial-success state.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Database-reported cause, preserved for diagnostics.
    #[source]
    pub cause: Option<DatabaseFailure>,
}

impl InternalError {
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            cause: None,
        }
    }

    /// Construct a compile-origin unsupported error.
    pub(crate) fn compile_unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Compile, message)
    }

    /// Construct a query-origin invariant violation.
    pub(crate) fn query_invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Query, message)
    }

    /// Construct an executor-origin invariant violation.
    pub(crate) fn executor_invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Executor, message)
    }

    /// Construct a model-origin invariant violation (bad row shape, bad field).
    pub(crate) fn model_invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Model, message)
    }

    /// Wrap a failure reported by the database access primitive.
    pub(crate) fn database(class: ErrorClass, failure: DatabaseFailure) -> Self {
        let message = match class {
            ErrorClass::Conflict => format!("duplicate key: {failure}"),
            _ => format!("database failure: {failure}"),
        };

        Self {
            class,
            origin: ErrorOrigin::Database,
            message,
            cause: Some(failure),
        }
    }

    /// True when the database rejected a write because of a uniqueness constraint.
    #[must_use]
    pub const fn is_duplicate_key(&self) -> bool {
        matches!(self.class, ErrorClass::Conflict)
    }

    /// True for errors raised before any statement reached the database.
    #[must_use]
    pub const fn is_compile_error(&self) -> bool {
        matches!(
            self.class,
            ErrorClass::Unsupported | ErrorClass::InvariantViolation
        ) && !matches!(self.origin, ErrorOrigin::Database)
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

///
/// ErrorClass
///
/// Error taxonomy shared by every subsystem.
/// `Transient` only exists between an attempt and the retry decision; callers
/// see it converted into `Database` once the single retry is spent.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    Unsupported,
    InvariantViolation,
    Conflict,
    Transient,
    Database,
    Internal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unsupported => "unsupported",
            Self::InvariantViolation => "invariant_violation",
            Self::Conflict => "conflict",
            Self::Transient => "transient",
            Self::Database => "database",
            Self::Internal => "internal",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Query,
    Compile,
    Key,
    Cache,
    Executor,
    Database,
    Model,
    Config,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Query => "query",
            Self::Compile => "compile",
            Self::Key => "key",
            Self::Cache => "cache",
            Self::Executor => "executor",
            Self::Database => "database",
            Self::Model => "model",
            Self::Config => "config",
        };
        write!(f, "{label}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_key_is_distinct_from_generic_failure() {
        let dup = InternalError::database(
            ErrorClass::Conflict,
            DatabaseFailure::new("unique violation").with_sql_state("23505"),
        );
        let generic = InternalError::database(
            ErrorClass::Database,
            DatabaseFailure::new("syntax error").with_sql_state("42601"),
        );

        assert!(dup.is_duplicate_key());
        assert!(!generic.is_duplicate_key());
        assert!(dup.cause.is_some());
        assert_eq!(generic.display_with_class(), "database:database: database failure: syntax error");
    }

    #[test]
    fn compile_errors_are_flagged() {
        let err = InternalError::compile_unsupported("nope");
        assert!(err.is_compile_error());
        assert_eq!(err.origin, ErrorOrigin::Compile);
    }
}
