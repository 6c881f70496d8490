use crate::{
    db::{
        Depot, DbSession,
        connection::Connection,
        executor::{CacheAction, classify_failure, surface},
    },
    error::InternalError,
};
use std::{cell::RefCell, fmt};
use tracing::warn;

///
/// Transaction
///
/// Explicit transaction bound to one connection for its whole lifetime.
///
/// Operations issued through [`Transaction::session`] join it: they share
/// the connection, never retry a transient failure on their own, and queue
/// their post-statement cache actions until `commit`. Dropping an unfinished
/// transaction rolls it back.
///

pub struct Transaction<'d> {
    depot: &'d Depot,
    conn: RefCell<Option<Box<dyn Connection>>>,
    deferred: RefCell<Vec<CacheAction>>,
}

impl<'d> Transaction<'d> {
    pub(crate) fn begin(depot: &'d Depot) -> Result<Self, InternalError> {
        let conn = depot
            .provider()
            .acquire()
            .map_err(|failure| surface(classify_failure(depot.dialect(), "transaction", failure)))?;

        Ok(Self {
            depot,
            conn: RefCell::new(Some(conn)),
            deferred: RefCell::new(Vec::new()),
        })
    }

    /// Session whose operations run inside this transaction.
    #[must_use]
    pub fn session(&self) -> DbSession<'_> {
        DbSession::new(self.depot, Some(self))
    }

    /// Commit, then apply every cache action queued by the joined operations.
    pub fn commit(self) -> Result<(), InternalError> {
        let Some(mut conn) = self.conn.borrow_mut().take() else {
            return Err(InternalError::executor_invariant(
                "transaction is already finished",
            ));
        };

        let provider = self.depot.provider();
        if let Err(failure) = conn.commit() {
            if let Err(err) = conn.rollback() {
                warn!(error = %err, "rollback after failed commit also failed");
            }
            provider.release(conn, true);

            return Err(surface(classify_failure(
                self.depot.dialect(),
                "transaction",
                failure,
            )));
        }
        provider.release(conn, false);

        let cache = self.depot.cache();
        for action in self.deferred.take() {
            action.apply(cache);
        }

        Ok(())
    }

    /// Roll back and discard the queued cache actions.
    pub fn rollback(self) -> Result<(), InternalError> {
        let Some(mut conn) = self.conn.borrow_mut().take() else {
            return Err(InternalError::executor_invariant(
                "transaction is already finished",
            ));
        };
        self.deferred.borrow_mut().clear();

        let result = conn.rollback();
        self.depot.provider().release(conn, result.is_err());

        result.map_err(|failure| {
            surface(classify_failure(self.depot.dialect(), "transaction", failure))
        })
    }

    pub(crate) fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut dyn Connection) -> T,
    ) -> Result<T, InternalError> {
        let mut slot = self.conn.borrow_mut();
        let conn = slot
            .as_deref_mut()
            .ok_or_else(|| InternalError::executor_invariant("transaction is already finished"))?;

        Ok(f(conn))
    }

    pub(crate) fn defer(&self, actions: Vec<CacheAction>) {
        self.deferred.borrow_mut().extend(actions);
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if let Some(mut conn) = self.conn.get_mut().take() {
            warn!("transaction dropped without commit; rolling back");
            let failed = conn.rollback().is_err();
            self.depot.provider().release(conn, failed);
        }
    }
}

impl fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("open", &self.conn.borrow().is_some())
            .field("deferred", &self.deferred.borrow().len())
            .finish()
    }
}
