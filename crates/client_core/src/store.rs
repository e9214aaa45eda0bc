use anyhow::Result;
use async_trait::async_trait;
use futures::{future, stream, StreamExt};
use shared::{
    domain::{DatabaseHandle, FlatRecord, Identity, ItemKind},
    error::ApiException,
};
use storage::{StoreChange, Storage};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::debug;

use crate::{ItemStore, RecordFeed, SessionProvider, SessionResult};

/// [`ItemStore`] over the local SQLite [`Storage`].
#[derive(Clone)]
pub struct SqliteItemStore {
    storage: Storage,
}

impl SqliteItemStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        Ok(Self::new(Storage::new(database_url).await?))
    }
}

#[async_trait]
impl ItemStore for SqliteItemStore {
    async fn list_databases(&self) -> Result<Vec<DatabaseHandle>> {
        self.storage.list_databases().await
    }

    async fn open_database(&self, handle: &DatabaseHandle) -> Result<RecordFeed> {
        if self.storage.database(&handle.project).await?.is_none() {
            return Err(ApiException::not_found(format!(
                "database {} does not exist",
                handle.project
            ))
            .into());
        }

        // Subscribe before the first read so no change slips in between.
        let changes = BroadcastStream::new(self.storage.subscribe_changes());
        let initial = self.storage.list_records(&handle.project).await?;

        let project = handle.project.clone();
        let storage = self.storage.clone();
        let updates = changes
            .filter_map(move |change| {
                let relevant = match change {
                    Ok(StoreChange::Records { project: changed }) => changed == project,
                    Ok(StoreChange::Databases) => false,
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        debug!("store: feed lagged skipped={skipped}, reloading");
                        true
                    }
                };
                future::ready(relevant.then_some(()))
            })
            .then({
                let project = handle.project.clone();
                move |()| {
                    let storage = storage.clone();
                    let project = project.clone();
                    async move { storage.list_records(&project).await }
                }
            });

        Ok(stream::once(future::ready(Ok(initial)))
            .chain(updates)
            .boxed())
    }

    async fn create_database(&self, handle: DatabaseHandle) -> Result<()> {
        self.storage.create_database(&handle).await
    }

    async fn write_record(&self, project: &str, record: FlatRecord) -> Result<()> {
        if record.kind == ItemKind::Project {
            if !self.storage.rename_database(&record.number, &record.title).await? {
                return Err(ApiException::not_found(format!(
                    "database {} does not exist",
                    record.number
                ))
                .into());
            }
            return Ok(());
        }
        self.storage.upsert_record(project, &record).await
    }

    async fn delete_record(&self, project: &str, kind: ItemKind, number: &str) -> Result<()> {
        let deleted = if kind == ItemKind::Project {
            self.storage.delete_database(number).await?
        } else {
            self.storage.delete_record(project, kind, number).await?
        };
        if !deleted {
            return Err(ApiException::not_found(format!(
                "{} {number} was already removed",
                kind.noun()
            ))
            .into());
        }
        Ok(())
    }
}

/// Session provider for single-user local use: a configured identity is
/// always signed in, an empty one never is.
pub struct LocalSessionProvider {
    identity: String,
}

impl LocalSessionProvider {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
        }
    }
}

#[async_trait]
impl SessionProvider for LocalSessionProvider {
    async fn establish_session(&self) -> Result<SessionResult> {
        if self.identity.trim().is_empty() {
            return Ok(SessionResult::NotAuthenticated);
        }
        Ok(SessionResult::Authenticated {
            identity: Identity {
                user: self.identity.clone(),
            },
        })
    }

    async fn sign_out(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
