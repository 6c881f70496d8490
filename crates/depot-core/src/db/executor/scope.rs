use crate::{
    db::{
        connection::{Connection, DatabaseFailure, StatementHandle},
        executor::{CacheAction, classify_failure},
        sql::{CompiledStatement, Dialect},
    },
    error::InternalError,
    obs::sink::{self, MetricsEvent},
    value::Value,
};
use tracing::debug;

///
/// ConnectionScope
///
/// One operation's view of a connection. Every statement handle it opens
/// is closed before the scope ends, on success and failure alike; the
/// connection itself is committed and released by the caller.
///

pub(crate) struct ConnectionScope<'c> {
    conn: &'c mut dyn Connection,
    dialect: &'static dyn Dialect,
    entity_path: &'static str,
    debug: bool,
    open: Vec<StatementHandle>,
    deferred: Vec<CacheAction>,
}

impl<'c> ConnectionScope<'c> {
    pub(crate) fn new(
        conn: &'c mut dyn Connection,
        dialect: &'static dyn Dialect,
        entity_path: &'static str,
        debug: bool,
    ) -> Self {
        Self {
            conn,
            dialect,
            entity_path,
            debug,
            open: Vec::new(),
            deferred: Vec::new(),
        }
    }

    fn fail(&self, failure: DatabaseFailure) -> InternalError {
        classify_failure(self.dialect, self.entity_path, failure)
    }

    fn prepare(&mut self, compiled: &CompiledStatement) -> Result<StatementHandle, InternalError> {
        if self.debug {
            debug!(
                entity = self.entity_path,
                sql = %compiled.sql,
                params = ?compiled.params(),
                "executing statement"
            );
        }

        let handle = self
            .conn
            .prepare(&compiled.sql)
            .map_err(|failure| self.fail(failure))?;
        self.open.push(handle);

        compiled
            .bind_all(&mut *self.conn, handle)
            .map_err(|failure| self.fail(failure))?;

        Ok(handle)
    }

    fn close(&mut self, handle: StatementHandle) {
        self.conn.close(handle);
        self.open.retain(|h| *h != handle);
        sink::record(MetricsEvent::StatementExecuted {
            entity_path: self.entity_path,
        });
    }

    /// Run a row-returning statement.
    pub(crate) fn query(
        &mut self,
        compiled: &CompiledStatement,
    ) -> Result<Vec<Vec<Value>>, InternalError> {
        let handle = self.prepare(compiled)?;
        let rows = self
            .conn
            .execute_query(handle)
            .map_err(|failure| self.fail(failure))?;
        self.close(handle);

        Ok(rows)
    }

    /// Run a mutating statement; returns the affected-row count.
    pub(crate) fn update(&mut self, compiled: &CompiledStatement) -> Result<u64, InternalError> {
        let handle = self.prepare(compiled)?;
        let rows = self
            .conn
            .execute_update(handle)
            .map_err(|failure| self.fail(failure))?;
        self.close(handle);

        Ok(rows)
    }

    /// Run an INSERT; also returns the identity value the database
    /// assigned, if any.
    pub(crate) fn insert(
        &mut self,
        compiled: &CompiledStatement,
    ) -> Result<(u64, Option<Value>), InternalError> {
        let handle = self.prepare(compiled)?;
        let rows = self
            .conn
            .execute_update(handle)
            .map_err(|failure| self.fail(failure))?;
        let generated = self
            .conn
            .generated_key(handle)
            .map_err(|failure| self.fail(failure))?;
        self.close(handle);

        Ok((rows, generated))
    }

    /// Queue a cache action for after commit.
    pub(crate) fn defer(&mut self, action: CacheAction) {
        self.deferred.push(action);
    }

    /// Close leftover handles and hand back the queued cache actions.
    pub(crate) fn finish(mut self) -> Vec<CacheAction> {
        self.close_all();
        std::mem::take(&mut self.deferred)
    }

    fn close_all(&mut self) {
        for handle in self.open.drain(..) {
            self.conn.close(handle);
        }
    }
}

impl Drop for ConnectionScope<'_> {
    fn drop(&mut self) {
        self.close_all();
    }
}
