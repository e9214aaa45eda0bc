use std::sync::Arc;

use numbering::{check, check_delete, check_project, check_update, HierarchicalSystem};
use shared::{
    domain::{DatabaseHandle, FlatRecord, ItemKind},
    protocol::{CheckOutcome, MutationRequest},
};
use tracing::{debug, info, warn};

use crate::{database::DatabaseClient, ItemStore};

const SESSION_ENDED: &str = "The session has ended.";

/// The only write path to the item store.
///
/// Every request is checked against the latest published tree first; only
/// admissible requests reach the store. Store failures come back as a
/// rejected [`CheckOutcome`] and leave the orchestrator untouched, so the
/// same request can simply be retried.
#[derive(Clone)]
pub struct MutationGate {
    store: Arc<dyn ItemStore>,
    database: DatabaseClient,
}

impl MutationGate {
    pub fn new(store: Arc<dyn ItemStore>, database: DatabaseClient) -> Self {
        Self { store, database }
    }

    pub async fn apply(&self, request: MutationRequest) -> CheckOutcome {
        debug!("mutation: applying {} of {}", request.name(), request.kind());
        match request {
            MutationRequest::Insert {
                kind,
                number,
                title,
                meta,
            } => {
                self.request_insert(FlatRecord {
                    kind,
                    number,
                    title,
                    meta,
                })
                .await
            }
            MutationRequest::Update {
                kind,
                number,
                title,
                meta,
            } => {
                self.request_update(FlatRecord {
                    kind,
                    number,
                    title,
                    meta,
                })
                .await
            }
            MutationRequest::Delete { kind, number } => self.request_delete(kind, &number).await,
        }
    }

    /// Inserts into the open database. Project candidates create a new
    /// database instead.
    pub async fn request_insert(&self, candidate: FlatRecord) -> CheckOutcome {
        if candidate.kind == ItemKind::Project {
            return self.create_database(candidate).await;
        }
        let (project, system) = match self.open_tree() {
            Ok(open) => open,
            Err(rejection) => return rejection,
        };

        let outcome = check(&system, &project, &candidate);
        if !outcome.success {
            return outcome;
        }
        self.write(&project, candidate).await
    }

    pub async fn request_update(&self, candidate: FlatRecord) -> CheckOutcome {
        let (project, system) = match self.open_tree() {
            Ok(open) => open,
            Err(rejection) => return rejection,
        };

        let outcome = check_update(&system, &project, &candidate);
        if !outcome.success {
            return outcome;
        }
        self.write(&project, candidate).await
    }

    pub async fn request_delete(&self, kind: ItemKind, number: &str) -> CheckOutcome {
        let (project, system) = match self.open_tree() {
            Ok(open) => open,
            Err(rejection) => return rejection,
        };

        let outcome = check_delete(&system, &project, kind, number);
        if !outcome.success {
            return outcome;
        }

        match self.store.delete_record(&project, kind, number).await {
            Ok(()) => {
                info!("mutation: deleted {kind} {number} project={project}");
                if kind == ItemKind::Project {
                    let _ = self.database.request_list();
                }
                CheckOutcome::ok()
            }
            Err(err) => {
                warn!("mutation: delete failed {kind} {number} project={project}: {err}");
                CheckOutcome::rejected(format!("Failed to remove the {}: {err}", kind.noun()))
            }
        }
    }

    /// Creates a new project database and asks for an immediate re-list so
    /// it shows up without waiting for the refresh timer.
    pub async fn create_database(&self, candidate: FlatRecord) -> CheckOutcome {
        if !self.database.is_running() {
            return CheckOutcome::rejected(SESSION_ENDED);
        }
        let snapshot = self.database.snapshot();
        let outcome = check_project(
            snapshot.databases.iter().map(|db| db.project.as_str()),
            &candidate,
        );
        if !outcome.success {
            return outcome;
        }

        let handle = DatabaseHandle::new(candidate.number, candidate.title);
        match self.store.create_database(handle.clone()).await {
            Ok(()) => {
                info!("mutation: created database project={}", handle.project);
                let _ = self.database.request_list();
                CheckOutcome::ok()
            }
            Err(err) => {
                warn!(
                    "mutation: create database failed project={}: {err}",
                    handle.project
                );
                CheckOutcome::rejected(format!("Failed to create the project: {err}"))
            }
        }
    }

    fn open_tree(&self) -> Result<(String, Arc<HierarchicalSystem>), CheckOutcome> {
        // The last snapshot outlives the orchestrator that published it.
        if !self.database.is_running() {
            return Err(CheckOutcome::rejected(SESSION_ENDED));
        }
        let snapshot = self.database.snapshot();
        let Some(project) = snapshot.open_project().map(str::to_string) else {
            return Err(CheckOutcome::rejected("No project is open."));
        };
        let Some(system) = snapshot.system else {
            return Err(CheckOutcome::rejected("The project is still loading."));
        };
        Ok((project, system))
    }

    async fn write(&self, project: &str, record: FlatRecord) -> CheckOutcome {
        let kind = record.kind;
        let number = record.number.clone();
        match self.store.write_record(project, record).await {
            Ok(()) => {
                info!("mutation: wrote {kind} {number} project={project}");
                if kind == ItemKind::Project {
                    let _ = self.database.request_list();
                }
                CheckOutcome::ok()
            }
            Err(err) => {
                warn!("mutation: write failed {kind} {number} project={project}: {err}");
                CheckOutcome::rejected(format!("Failed to save the {}: {err}", kind.noun()))
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/mutation_tests.rs"]
mod tests;
