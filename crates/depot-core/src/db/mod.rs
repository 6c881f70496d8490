pub mod cache;
pub mod connection;
mod executor;
pub mod query;
mod session;
pub mod sql;
mod transaction;

pub use session::DbSession;
pub use transaction::Transaction;

use crate::{
    config::DepotConfig,
    db::{
        cache::{CacheAdapter, CacheCoordinator},
        connection::ConnectionProvider,
        sql::Dialect,
    },
    error::InternalError,
};
use std::{fmt, sync::Arc};

///
/// Depot
///
/// Shared entry point: one connection provider, one dialect, one cache
/// coordinator and the runtime config. Cheap to borrow from many threads;
/// every operation runs through a [`DbSession`].
///

pub struct Depot {
    provider: Arc<dyn ConnectionProvider>,
    cache: CacheCoordinator,
    config: DepotConfig,
}

impl Depot {
    /// Depot without a cache; every strategy degrades to direct execution.
    pub fn new(
        provider: Arc<dyn ConnectionProvider>,
        config: DepotConfig,
    ) -> Result<Self, InternalError> {
        config.validate()?;

        Ok(Self {
            provider,
            cache: CacheCoordinator::disabled(),
            config,
        })
    }

    #[must_use]
    pub fn with_cache(mut self, adapter: Arc<dyn CacheAdapter>) -> Self {
        self.cache = CacheCoordinator::new(adapter);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &DepotConfig {
        &self.config
    }

    #[must_use]
    pub fn dialect(&self) -> &'static dyn Dialect {
        self.config.dialect.dialect()
    }

    #[must_use]
    pub const fn cache(&self) -> &CacheCoordinator {
        &self.cache
    }

    /// Keys per batched fetch: the configured cap, else the dialect's.
    #[must_use]
    pub fn max_in_keys(&self) -> usize {
        self.config
            .max_in_keys
            .unwrap_or_else(|| self.dialect().max_in_keys())
    }

    /// Auto-commit session: every operation owns its own connection.
    #[must_use]
    pub fn session(&self) -> DbSession<'_> {
        DbSession::new(self, None)
    }

    /// Open an explicit transaction on a freshly acquired connection.
    pub fn begin(&self) -> Result<Transaction<'_>, InternalError> {
        Transaction::begin(self)
    }

    pub(crate) fn provider(&self) -> &dyn ConnectionProvider {
        self.provider.as_ref()
    }
}

impl fmt::Debug for Depot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Depot")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
