use crate::{
    db::{
        Depot, Transaction,
        executor::{Context, DeleteExecutor, LoadExecutor, SaveExecutor},
        query::{CreateIndexStatement, DropIndexStatement, Expr, Query, Statement, WhereClause},
    },
    error::InternalError,
    key::{Key, KeySet},
    obs::sink::{MetricsSink, with_metrics_sink},
    traits::Record,
};
use std::{fmt, sync::Arc};

///
/// DbSession
///
/// Session-scoped database handle with policy (debug, metrics) and execution
/// routing. A session taken from a [`Transaction`] runs every operation on
/// the transaction's connection.
///

pub struct DbSession<'a> {
    depot: &'a Depot,
    tx: Option<&'a Transaction<'a>>,
    debug: bool,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl<'a> DbSession<'a> {
    pub(crate) const fn new(depot: &'a Depot, tx: Option<&'a Transaction<'a>>) -> Self {
        Self {
            depot,
            tx,
            debug: depot.config().debug,
            metrics: None,
        }
    }

    #[must_use]
    pub const fn debug(mut self) -> Self {
        self.debug = true;
        self
    }

    #[must_use]
    pub fn metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    #[must_use]
    pub const fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    fn with_metrics<T>(&self, f: impl FnOnce() -> T) -> T {
        if let Some(sink) = &self.metrics {
            with_metrics_sink(Arc::clone(sink), f)
        } else {
            f()
        }
    }

    const fn context(&self) -> Context<'a> {
        Context::new(self.depot, self.tx, self.debug)
    }

    const fn load_executor<R: Record>(&self) -> LoadExecutor<'a, R> {
        LoadExecutor::new(self.context())
    }

    const fn save_executor<R: Record>(&self) -> SaveExecutor<'a, R> {
        SaveExecutor::new(self.context())
    }

    const fn delete_executor<R: Record>(&self) -> DeleteExecutor<'a, R> {
        DeleteExecutor::new(self.context())
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// First record matching `query`, if any.
    pub fn load<R: Record>(&self, query: &Query<R>) -> Result<Option<R>, InternalError> {
        self.with_metrics(|| self.load_executor::<R>().load(query))
    }

    pub fn load_by_key<R: Record>(&self, key: &Key) -> Result<Option<R>, InternalError> {
        self.with_metrics(|| self.load_executor::<R>().load_by_key(key))
    }

    /// Records for a key set, in set order; missing rows are skipped.
    pub fn load_all<R: Record>(&self, keys: &KeySet) -> Result<Vec<R>, InternalError> {
        self.with_metrics(|| self.load_executor::<R>().load_all(keys))
    }

    /// Every record matching `query`, using the query's cache strategy (or
    /// the configured default).
    pub fn find_all<R: Record>(&self, query: &Query<R>) -> Result<Vec<R>, InternalError> {
        self.with_metrics(|| self.load_executor::<R>().find_all(query))
    }

    pub fn find_all_keys<R: Record>(&self, query: &Query<R>) -> Result<Vec<Key>, InternalError> {
        self.with_metrics(|| self.load_executor::<R>().find_all_keys(query))
    }

    pub fn count<R: Record>(&self, query: &Query<R>) -> Result<u64, InternalError> {
        self.with_metrics(|| self.load_executor::<R>().count(query))
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    /// Insert and return the stored record (with any generated key).
    pub fn insert<R: Record>(&self, record: R) -> Result<R, InternalError> {
        self.with_metrics(|| self.save_executor::<R>().insert(record))
    }

    pub fn update<R: Record>(&self, record: &R) -> Result<u64, InternalError> {
        self.with_metrics(|| self.save_executor::<R>().update(record))
    }

    /// Update if the row exists, else insert.
    pub fn store<R: Record>(&self, record: R) -> Result<R, InternalError> {
        self.with_metrics(|| self.save_executor::<R>().store(record))
    }

    pub fn update_partial<R: Record>(
        &self,
        key: &Key,
        sets: Vec<(&'static str, Expr)>,
    ) -> Result<u64, InternalError> {
        self.with_metrics(|| self.save_executor::<R>().update_partial(key, sets))
    }

    pub fn update_partial_where<R: Record>(
        &self,
        where_clause: impl Into<WhereClause>,
        sets: Vec<(&'static str, Expr)>,
    ) -> Result<u64, InternalError> {
        let where_clause = where_clause.into();
        self.with_metrics(|| {
            self.save_executor::<R>()
                .update_partial_where(where_clause, sets)
        })
    }

    pub fn delete<R: Record>(&self, key: &Key) -> Result<u64, InternalError> {
        self.with_metrics(|| self.delete_executor::<R>().delete(key))
    }

    pub fn delete_all<R: Record>(
        &self,
        where_clause: impl Into<WhereClause>,
    ) -> Result<u64, InternalError> {
        let where_clause = where_clause.into();
        self.with_metrics(|| self.delete_executor::<R>().delete_all(where_clause))
    }

    // ---------------------------------------------------------------------
    // Schema
    // ---------------------------------------------------------------------

    pub fn create_index(&self, statement: CreateIndexStatement) -> Result<(), InternalError> {
        self.execute_ddl(&Statement::CreateIndex(statement))
    }

    pub fn drop_index(&self, statement: DropIndexStatement) -> Result<(), InternalError> {
        self.execute_ddl(&Statement::DropIndex(statement))
    }

    fn execute_ddl(&self, statement: &Statement) -> Result<(), InternalError> {
        self.with_metrics(|| {
            let ctx = self.context();
            let compiled = ctx.compile(statement)?;
            ctx.run(statement.model().path, |scope| scope.update(&compiled).map(|_| ()))
        })
    }
}

impl fmt::Debug for DbSession<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbSession")
            .field("debug", &self.debug)
            .field("in_transaction", &self.in_transaction())
            .field("metrics", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}
