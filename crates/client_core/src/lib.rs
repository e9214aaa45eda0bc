//! Session and database lifecycle for PROACID item stores.
//!
//! A [`SessionOrchestrator`] owns authentication state and, while a session
//! is authenticated, exactly one [`DatabaseOrchestrator`]. The database
//! orchestrator keeps the database list fresh, follows the open project's
//! record feed and republishes an immutable tree snapshot on every change.
//! Writes go through a [`MutationGate`].

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use shared::domain::{DatabaseHandle, FlatRecord, Identity, ItemKind};

pub mod config;
pub mod database;
pub mod error;
pub mod mutation;
pub mod session;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{load_settings, prepare_database_url, Settings};
pub use database::{DatabaseClient, DatabaseOrchestrator, DatabasePhase, DatabaseSnapshot};
pub use error::OrchestratorError;
pub use mutation::MutationGate;
pub use session::{SessionOrchestrator, SessionState};
pub use store::{LocalSessionProvider, SqliteItemStore};

/// Live record feed for one open database: an initial snapshot followed by a
/// full snapshot after every change.
pub type RecordFeed = BoxStream<'static, Result<Vec<FlatRecord>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionResult {
    Authenticated { identity: Identity },
    NotAuthenticated,
}

/// External authentication provider.
///
/// `establish_session` returns `Err` only for infrastructure faults; "no
/// session" is the ordinary [`SessionResult::NotAuthenticated`].
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn establish_session(&self) -> Result<SessionResult>;
    async fn sign_out(&self) -> Result<()>;
}

#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn list_databases(&self) -> Result<Vec<DatabaseHandle>>;
    async fn open_database(&self, handle: &DatabaseHandle) -> Result<RecordFeed>;
    async fn create_database(&self, handle: DatabaseHandle) -> Result<()>;
    async fn write_record(&self, project: &str, record: FlatRecord) -> Result<()>;
    async fn delete_record(&self, project: &str, kind: ItemKind, number: &str) -> Result<()>;
}

/// Everything one session needs, passed explicitly instead of living in
/// process-wide state.
#[derive(Clone)]
pub struct SessionContext {
    pub provider: Arc<dyn SessionProvider>,
    pub store: Arc<dyn ItemStore>,
    pub refresh_interval: Duration,
}

impl SessionContext {
    pub fn new(provider: Arc<dyn SessionProvider>, store: Arc<dyn ItemStore>) -> Self {
        Self {
            provider,
            store,
            refresh_interval: database::DEFAULT_REFRESH_INTERVAL,
        }
    }

    pub fn with_refresh_interval(mut self, refresh_interval: Duration) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }
}
