use crate::value::Value;
use thiserror::Error as ThisError;

///
/// DatabaseFailure
///
/// Raw failure reported by the database access primitive. Classification
/// into transient / duplicate-key / other is the dialect's job.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("{message}")]
pub struct DatabaseFailure {
    pub message: String,
    /// Five-character SQLSTATE, when the driver reports one.
    pub sql_state: Option<String>,
    /// Vendor-specific numeric error code.
    pub vendor_code: Option<i32>,
}

impl DatabaseFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sql_state: None,
            vendor_code: None,
        }
    }

    #[must_use]
    pub fn with_sql_state(mut self, state: impl Into<String>) -> Self {
        self.sql_state = Some(state.into());
        self
    }

    #[must_use]
    pub const fn with_vendor_code(mut self, code: i32) -> Self {
        self.vendor_code = Some(code);
        self
    }

    /// SQLSTATE class (first two characters), if any.
    #[must_use]
    pub fn sql_state_class(&self) -> Option<&str> {
        self.sql_state.as_deref().and_then(|s| s.get(..2))
    }
}

///
/// StatementHandle
///
/// Opaque id of a prepared statement, valid on the connection that issued it.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct StatementHandle(pub u64);

///
/// Connection
///
/// Blocking prepare / bind / execute primitive. Bind indexes are 1-based,
/// matching placeholder order in the SQL text.
///

pub trait Connection: Send {
    fn prepare(&mut self, sql: &str) -> Result<StatementHandle, DatabaseFailure>;

    fn bind(
        &mut self,
        handle: StatementHandle,
        index: usize,
        value: &Value,
    ) -> Result<(), DatabaseFailure>;

    /// Run a row-returning statement; each row holds one value per projected
    /// column.
    fn execute_query(&mut self, handle: StatementHandle) -> Result<Vec<Vec<Value>>, DatabaseFailure>;

    /// Run a mutating statement and return the affected-row count.
    fn execute_update(&mut self, handle: StatementHandle) -> Result<u64, DatabaseFailure>;

    /// Value assigned by an identity column during the last execution of
    /// `handle`, if any.
    fn generated_key(&mut self, handle: StatementHandle) -> Result<Option<Value>, DatabaseFailure>;

    fn close(&mut self, handle: StatementHandle);

    fn commit(&mut self) -> Result<(), DatabaseFailure>;

    fn rollback(&mut self) -> Result<(), DatabaseFailure>;
}

///
/// ConnectionProvider
///
/// Acquire/release boundary. Pooling lives behind it.
///

pub trait ConnectionProvider: Send + Sync {
    fn acquire(&self) -> Result<Box<dyn Connection>, DatabaseFailure>;

    /// Hand a connection back. `failed` is set when the operation aborted, so
    /// the provider can discard rather than reuse it.
    fn release(&self, conn: Box<dyn Connection>, failed: bool);
}
