use crate::{
    db::connection::{Connection, ConnectionProvider, DatabaseFailure, StatementHandle},
    value::Value,
};
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, PoisonError},
};

///
/// Executed
/// One statement execution as the database saw it.
///

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Executed {
    pub(crate) sql: String,
    pub(crate) params: Vec<Value>,
}

///
/// Reply
/// Scripted outcome of one execution.
///

#[derive(Clone, Debug)]
pub(crate) enum Reply {
    Rows(Vec<Vec<Value>>),
    Affected(u64),
    Inserted { rows: u64, key: Value },
    Fail(DatabaseFailure),
}

type Handler = dyn Fn(&str, &[Value]) -> Reply + Send + Sync;

#[derive(Default)]
struct Journal {
    executed: Vec<Executed>,
    failures: VecDeque<DatabaseFailure>,
    open_handles: usize,
    commits: usize,
    rollbacks: usize,
    acquired: usize,
    released_failed: usize,
}

struct Shared {
    handler: Box<Handler>,
    journal: Mutex<Journal>,
}

///
/// ScriptedDatabase
///
/// In-memory stand-in for a database: every execution is journaled and
/// answered by the handler; queued failures are returned instead, one per
/// execution, before the handler runs.
///

#[derive(Clone)]
pub(crate) struct ScriptedDatabase {
    shared: Arc<Shared>,
}

impl ScriptedDatabase {
    pub(crate) fn new(handler: impl Fn(&str, &[Value]) -> Reply + Send + Sync + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                handler: Box::new(handler),
                journal: Mutex::default(),
            }),
        }
    }

    fn with_journal<T>(&self, f: impl FnOnce(&mut Journal) -> T) -> T {
        let mut journal = self
            .shared
            .journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut journal)
    }

    /// Fail the next execution with `failure`.
    pub(crate) fn fail_next(&self, failure: DatabaseFailure) {
        self.with_journal(|j| j.failures.push_back(failure));
    }

    pub(crate) fn executed(&self) -> Vec<Executed> {
        self.with_journal(|j| j.executed.clone())
    }

    /// Executions whose SQL contains `fragment`.
    pub(crate) fn count_matching(&self, fragment: &str) -> usize {
        self.with_journal(|j| j.executed.iter().filter(|e| e.sql.contains(fragment)).count())
    }

    pub(crate) fn clear(&self) {
        self.with_journal(|j| j.executed.clear());
    }

    pub(crate) fn open_handles(&self) -> usize {
        self.with_journal(|j| j.open_handles)
    }

    pub(crate) fn commits(&self) -> usize {
        self.with_journal(|j| j.commits)
    }

    pub(crate) fn rollbacks(&self) -> usize {
        self.with_journal(|j| j.rollbacks)
    }

    pub(crate) fn acquired(&self) -> usize {
        self.with_journal(|j| j.acquired)
    }

    pub(crate) fn released_failed(&self) -> usize {
        self.with_journal(|j| j.released_failed)
    }

    fn execute(&self, prepared: &Prepared) -> Result<Reply, DatabaseFailure> {
        let failure = self.with_journal(|j| {
            j.executed.push(Executed {
                sql: prepared.sql.clone(),
                params: prepared.params.clone(),
            });
            j.failures.pop_front()
        });
        if let Some(failure) = failure {
            return Err(failure);
        }

        Ok((self.shared.handler)(&prepared.sql, &prepared.params))
    }
}

impl ConnectionProvider for ScriptedDatabase {
    fn acquire(&self) -> Result<Box<dyn Connection>, DatabaseFailure> {
        self.with_journal(|j| j.acquired += 1);

        Ok(Box::new(ScriptedConnection {
            db: self.clone(),
            prepared: HashMap::new(),
            next: 0,
        }))
    }

    fn release(&self, _conn: Box<dyn Connection>, failed: bool) {
        if failed {
            self.with_journal(|j| j.released_failed += 1);
        }
    }
}

struct Prepared {
    sql: String,
    params: Vec<Value>,
    generated: Option<Value>,
}

struct ScriptedConnection {
    db: ScriptedDatabase,
    prepared: HashMap<u64, Prepared>,
    next: u64,
}

impl ScriptedConnection {
    fn statement(&mut self, handle: StatementHandle) -> Result<&mut Prepared, DatabaseFailure> {
        self.prepared
            .get_mut(&handle.0)
            .ok_or_else(|| DatabaseFailure::new(format!("unknown statement {}", handle.0)))
    }
}

impl Connection for ScriptedConnection {
    fn prepare(&mut self, sql: &str) -> Result<StatementHandle, DatabaseFailure> {
        self.next += 1;
        self.prepared.insert(
            self.next,
            Prepared {
                sql: sql.to_string(),
                params: Vec::new(),
                generated: None,
            },
        );
        self.db.with_journal(|j| j.open_handles += 1);

        Ok(StatementHandle(self.next))
    }

    fn bind(
        &mut self,
        handle: StatementHandle,
        index: usize,
        value: &Value,
    ) -> Result<(), DatabaseFailure> {
        let prepared = self.statement(handle)?;
        if prepared.params.len() < index {
            prepared.params.resize(index, Value::Null);
        }
        prepared.params[index - 1] = value.clone();

        Ok(())
    }

    fn execute_query(&mut self, handle: StatementHandle) -> Result<Vec<Vec<Value>>, DatabaseFailure> {
        let db = self.db.clone();
        match db.execute(self.statement(handle)?)? {
            Reply::Rows(rows) => Ok(rows),
            Reply::Affected(_) | Reply::Inserted { .. } => Ok(Vec::new()),
            Reply::Fail(failure) => Err(failure),
        }
    }

    fn execute_update(&mut self, handle: StatementHandle) -> Result<u64, DatabaseFailure> {
        let db = self.db.clone();
        let prepared = self.statement(handle)?;
        match db.execute(prepared)? {
            Reply::Rows(_) => Ok(0),
            Reply::Affected(rows) => Ok(rows),
            Reply::Inserted { rows, key } => {
                prepared.generated = Some(key);
                Ok(rows)
            }
            Reply::Fail(failure) => Err(failure),
        }
    }

    fn generated_key(&mut self, handle: StatementHandle) -> Result<Option<Value>, DatabaseFailure> {
        Ok(self.statement(handle)?.generated.take())
    }

    fn close(&mut self, handle: StatementHandle) {
        if self.prepared.remove(&handle.0).is_some() {
            self.db.with_journal(|j| j.open_handles -= 1);
        }
    }

    fn commit(&mut self) -> Result<(), DatabaseFailure> {
        self.db.with_journal(|j| j.commits += 1);
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DatabaseFailure> {
        self.db.with_journal(|j| j.rollbacks += 1);
        Ok(())
    }
}
