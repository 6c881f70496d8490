use crate::{
    db::{
        Depot, Transaction,
        cache::{CacheCategory, CacheCoordinator, CacheKey, CacheValue},
        connection::DatabaseFailure,
        executor::ConnectionScope,
        query::{SelectQuery, Statement, WhereClause},
        sql::{self, CompiledStatement, Dialect, FailureKind},
    },
    error::{ErrorClass, InternalError},
    key::{Key, KeySet},
    model::{EntityModel, FieldKind},
    obs::sink::{self, MetricsEvent},
    value::Value,
};
use tracing::{debug, warn};

///
/// CacheAction
///
/// Cache mutation that must wait until the statement that justified it has
/// committed. Auto-commit operations apply these right after commit; a
/// transaction queues them until its own commit.
///

#[derive(Clone, Debug)]
pub(crate) enum CacheAction {
    /// Write-through of a full record snapshot.
    Store { key: Key, values: Vec<Value> },
    /// Non-record entry (keyset or whole result).
    StoreEntry {
        category: CacheCategory,
        cache_id: String,
        key: CacheKey,
        value: CacheValue,
    },
    Invalidate(Key),
    InvalidateSet(KeySet),
    /// Every record entry of one type.
    InvalidateAll(&'static EntityModel),
}

impl CacheAction {
    /// Invalidation that covers every row a where clause can touch.
    pub(crate) fn invalidation_for(
        model: &'static EntityModel,
        where_clause: &WhereClause,
    ) -> Self {
        match where_clause {
            WhereClause::Key(key) => Self::Invalidate(key.clone()),
            WhereClause::KeySet(set) => Self::InvalidateSet(set.clone()),
            WhereClause::Expr(_) => Self::InvalidateAll(model),
        }
    }

    pub(crate) fn apply(self, cache: &CacheCoordinator) {
        match self {
            Self::Store { key, values } => cache.store_record_values(&key, values),
            Self::StoreEntry {
                category,
                cache_id,
                key,
                value,
            } => cache.store(category, &cache_id, key, value),
            Self::Invalidate(key) => cache.invalidate(&key),
            Self::InvalidateSet(set) => cache.invalidate_set(&set),
            Self::InvalidateAll(model) => {
                cache.invalidate_all(model);
            }
        }
    }
}

/// Map a raw database failure to its error class.
pub(crate) fn classify_failure(
    dialect: &dyn Dialect,
    entity_path: &'static str,
    failure: DatabaseFailure,
) -> InternalError {
    match dialect.classify(&failure) {
        FailureKind::Transient => InternalError::database(ErrorClass::Transient, failure),
        FailureKind::DuplicateKey => {
            sink::record(MetricsEvent::DuplicateKey { entity_path });
            InternalError::database(ErrorClass::Conflict, failure)
        }
        FailureKind::Other => InternalError::database(ErrorClass::Database, failure),
    }
}

/// Transient failures are only meaningful to the retry decision; once that
/// has been made they surface as generic database failures.
pub(crate) fn surface(mut err: InternalError) -> InternalError {
    if err.class == ErrorClass::Transient {
        err.class = ErrorClass::Database;
    }
    err
}

///
/// Context
///
/// Per-operation execution environment derived from a session: where the
/// connection comes from, and whether to log.
///

#[derive(Clone, Copy)]
pub(crate) struct Context<'a> {
    depot: &'a Depot,
    tx: Option<&'a Transaction<'a>>,
    debug: bool,
}

impl<'a> Context<'a> {
    pub(crate) const fn new(
        depot: &'a Depot,
        tx: Option<&'a Transaction<'a>>,
        debug: bool,
    ) -> Self {
        Self { depot, tx, debug }
    }

    pub(crate) const fn depot(&self) -> &'a Depot {
        self.depot
    }

    pub(crate) const fn cache(&self) -> &'a CacheCoordinator {
        self.depot.cache()
    }

    pub(crate) fn debug_log(&self, entity_path: &'static str, message: impl AsRef<str>) {
        if self.debug {
            debug!(entity = entity_path, "{}", message.as_ref());
        }
    }

    pub(crate) fn compile(&self, statement: &Statement) -> Result<CompiledStatement, InternalError> {
        let compiled = sql::compile(statement, self.depot.dialect())?;
        self.debug_log(statement.model().path, format!("compiled: {}", compiled.sql));

        Ok(compiled)
    }

    pub(crate) fn compile_select(
        &self,
        query: &SelectQuery,
    ) -> Result<CompiledStatement, InternalError> {
        let compiled = sql::compile_select(query, self.depot.dialect())?;
        self.debug_log(query.model.path, format!("compiled: {}", compiled.sql));

        Ok(compiled)
    }

    /// Run `op` against a connection and commit.
    ///
    /// Outside a transaction a transient failure reacquires a connection
    /// and runs `op` once more; inside one the failure surfaces directly.
    /// Cache actions queued by `op` are applied only after a commit.
    pub(crate) fn run<T>(
        &self,
        entity_path: &'static str,
        mut op: impl FnMut(&mut ConnectionScope<'_>) -> Result<T, InternalError>,
    ) -> Result<T, InternalError> {
        if let Some(tx) = self.tx {
            return self.run_in_transaction(tx, entity_path, op);
        }

        let mut retried = false;
        loop {
            match self.attempt(entity_path, &mut op) {
                Ok((value, deferred)) => {
                    let cache = self.cache();
                    for action in deferred {
                        action.apply(cache);
                    }

                    return Ok(value);
                }
                Err(err)
                    if err.class == ErrorClass::Transient
                        && !retried
                        && self.depot.config().retry_transient =>
                {
                    warn!(entity = entity_path, error = %err, "transient failure, retrying once");
                    sink::record(MetricsEvent::TransientRetry { entity_path });
                    retried = true;
                }
                Err(err) => return Err(surface(err)),
            }
        }
    }

    fn attempt<T>(
        &self,
        entity_path: &'static str,
        op: &mut impl FnMut(&mut ConnectionScope<'_>) -> Result<T, InternalError>,
    ) -> Result<(T, Vec<CacheAction>), InternalError> {
        let dialect = self.depot.dialect();
        let provider = self.depot.provider();
        let mut conn = provider
            .acquire()
            .map_err(|failure| classify_failure(dialect, entity_path, failure))?;

        let mut scope = ConnectionScope::new(conn.as_mut(), dialect, entity_path, self.debug);
        let result = op(&mut scope);
        let deferred = scope.finish();

        let result = result.and_then(|value| {
            conn.commit()
                .map(|()| value)
                .map_err(|failure| classify_failure(dialect, entity_path, failure))
        });

        match result {
            Ok(value) => {
                provider.release(conn, false);
                Ok((value, deferred))
            }
            Err(err) => {
                if let Err(failure) = conn.rollback() {
                    warn!(entity = entity_path, error = %failure, "rollback failed");
                }
                provider.release(conn, true);
                Err(err)
            }
        }
    }

    fn run_in_transaction<T>(
        &self,
        tx: &Transaction<'_>,
        entity_path: &'static str,
        mut op: impl FnMut(&mut ConnectionScope<'_>) -> Result<T, InternalError>,
    ) -> Result<T, InternalError> {
        let dialect = self.depot.dialect();
        let (result, deferred) = tx.with_connection(|conn| {
            let mut scope = ConnectionScope::new(conn, dialect, entity_path, self.debug);
            let result = op(&mut scope);
            (result, scope.finish())
        })?;

        match result {
            Ok(value) => {
                tx.defer(deferred);
                Ok(value)
            }
            Err(err) => Err(surface(err)),
        }
    }
}

// row decoding

/// Spread one result row over a full field vector; unprojected fields are
/// null.
pub(crate) fn row_values(
    model: &'static EntityModel,
    columns: &[&'static str],
    row: Vec<Value>,
) -> Result<Vec<Value>, InternalError> {
    if row.len() != columns.len() {
        return Err(InternalError::executor_invariant(format!(
            "{}: row carries {} values for {} projected columns",
            model.path,
            row.len(),
            columns.len()
        )));
    }

    let mut values = vec![Value::Null; model.fields.len()];
    for (name, value) in columns.iter().zip(row) {
        let index = model.field_index(name).ok_or_else(|| {
            InternalError::model_invariant(format!("{}: unknown projected field '{name}'", model.path))
        })?;
        values[index] = normalize(model.fields[index].kind, value);
    }

    Ok(values)
}

/// Key of one keys-only result row.
pub(crate) fn row_key(
    model: &'static EntityModel,
    columns: &[&'static str],
    row: Vec<Value>,
) -> Result<Key, InternalError> {
    let values = row_values(model, columns, row)?;

    Ok(Key::from_record_values(model, &values)?)
}

// Undo the bind-side array encodings.
fn normalize(kind: FieldKind, value: Value) -> Value {
    match (kind, value) {
        (FieldKind::IntArray, Value::Blob(bytes)) => match Value::unpack_int_array(&bytes) {
            Some(items) => Value::IntArray(items),
            None => Value::Blob(bytes),
        },
        (FieldKind::IntArray, Value::List(items)) => {
            let ints: Option<Vec<i32>> = items
                .iter()
                .map(|v| v.as_int().and_then(|i| i32::try_from(i).ok()))
                .collect();
            match ints {
                Some(ints) => Value::IntArray(ints),
                None => Value::List(items),
            }
        }
        (_, value) => value,
    }
}
