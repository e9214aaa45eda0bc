use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use numbering::{build, HierarchicalSystem};
use shared::domain::{DatabaseHandle, FlatRecord};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{error::OrchestratorError, mutation::MutationGate, ItemStore};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabasePhase {
    ListingDatabases,
    Idle,
}

/// What readers see. Replaced wholesale on every change.
#[derive(Debug, Clone)]
pub struct DatabaseSnapshot {
    pub phase: DatabasePhase,
    pub databases: Arc<Vec<DatabaseHandle>>,
    /// Database the orchestrator is tracking, loaded or not.
    pub open: Option<DatabaseHandle>,
    /// Tree of `open`; `None` until its first feed snapshot arrives.
    pub system: Option<Arc<HierarchicalSystem>>,
    pub loading: bool,
    pub list_error: Option<String>,
    pub open_error: Option<String>,
}

impl DatabaseSnapshot {
    fn initial() -> Self {
        Self {
            phase: DatabasePhase::ListingDatabases,
            databases: Arc::new(Vec::new()),
            open: None,
            system: None,
            loading: false,
            list_error: None,
            open_error: None,
        }
    }

    pub fn open_project(&self) -> Option<&str> {
        self.open.as_ref().map(|handle| handle.project.as_str())
    }

    pub fn is_listed(&self, project: &str) -> bool {
        self.databases.iter().any(|db| db.project == project)
    }
}

type ListReply = oneshot::Sender<Result<Arc<Vec<DatabaseHandle>>, OrchestratorError>>;
type SwitchReply = oneshot::Sender<Result<(), OrchestratorError>>;

enum DatabaseEvent {
    ListNow {
        reply: Option<ListReply>,
    },
    RefreshDue {
        timer: u64,
    },
    Listed {
        result: Result<Vec<DatabaseHandle>, String>,
    },
    Switch {
        project: String,
        reply: SwitchReply,
    },
    FeedSnapshot {
        generation: u64,
        records: Vec<FlatRecord>,
    },
    FeedFailed {
        generation: u64,
        reason: String,
    },
}

/// Owning handle of a running database orchestrator.
///
/// Dropping it (or calling [`DatabaseOrchestrator::shutdown`]) tears the
/// actor down together with its list, feed and timer tasks; completions
/// that arrive afterwards have nowhere to go.
pub struct DatabaseOrchestrator {
    client: DatabaseClient,
    task: JoinHandle<()>,
}

impl DatabaseOrchestrator {
    pub fn spawn(store: Arc<dyn ItemStore>, refresh_interval: Duration) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(DatabaseSnapshot::initial());

        let actor = DatabaseActor {
            store: Arc::clone(&store),
            refresh_interval,
            events: events_tx.clone(),
            snapshot: snapshot_tx,
            list_task: None,
            relist_pending: false,
            list_replies: Vec::new(),
            queued_list_replies: Vec::new(),
            timer: None,
            timer_generation: 0,
            feed_task: None,
            generation: 0,
            records: None,
        };
        let task = tokio::spawn(actor.run(events_rx));

        Self {
            client: DatabaseClient {
                events: events_tx,
                snapshot: snapshot_rx,
                store,
            },
            task,
        }
    }

    pub fn client(&self) -> DatabaseClient {
        self.client.clone()
    }

    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for DatabaseOrchestrator {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Cloneable access to a database orchestrator for readers and writers.
#[derive(Clone)]
pub struct DatabaseClient {
    events: mpsc::UnboundedSender<DatabaseEvent>,
    snapshot: watch::Receiver<DatabaseSnapshot>,
    store: Arc<dyn ItemStore>,
}

impl DatabaseClient {
    pub fn snapshot(&self) -> DatabaseSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DatabaseSnapshot> {
        self.snapshot.clone()
    }

    pub fn system(&self) -> Option<Arc<HierarchicalSystem>> {
        self.snapshot.borrow().system.clone()
    }

    pub fn open_project(&self) -> Option<String> {
        self.snapshot.borrow().open_project().map(str::to_string)
    }

    pub fn is_running(&self) -> bool {
        !self.events.is_closed()
    }

    pub fn mutation_gate(&self) -> MutationGate {
        MutationGate::new(Arc::clone(&self.store), self.clone())
    }

    /// Lists immediately instead of waiting for the refresh timer and
    /// resolves with the resulting list.
    pub async fn list_databases_now(&self) -> Result<Arc<Vec<DatabaseHandle>>, OrchestratorError> {
        let (reply, rx) = oneshot::channel();
        self.send(DatabaseEvent::ListNow { reply: Some(reply) })?;
        rx.await.map_err(|_| OrchestratorError::DatabaseShutDown)?
    }

    /// Fire-and-forget variant of [`Self::list_databases_now`].
    pub fn request_list(&self) -> Result<(), OrchestratorError> {
        self.send(DatabaseEvent::ListNow { reply: None })
    }

    /// Makes `project` the open database. Resolves once the switch is
    /// accepted; the tree follows asynchronously.
    pub async fn switch_database(&self, project: &str) -> Result<(), OrchestratorError> {
        let (reply, rx) = oneshot::channel();
        self.send(DatabaseEvent::Switch {
            project: project.to_string(),
            reply,
        })?;
        rx.await.map_err(|_| OrchestratorError::DatabaseShutDown)?
    }

    /// Waits until `project` is open and its tree is loaded.
    pub async fn wait_for_tree(
        &self,
        project: &str,
    ) -> Result<Arc<HierarchicalSystem>, OrchestratorError> {
        let mut rx = self.snapshot.clone();
        let snapshot = rx
            .wait_for(|snapshot| {
                snapshot.open_project() != Some(project)
                    || (!snapshot.loading
                        && (snapshot.system.is_some() || snapshot.open_error.is_some()))
            })
            .await
            .map_err(|_| OrchestratorError::DatabaseShutDown)?
            .clone();

        if snapshot.open_project() != Some(project) {
            return Err(OrchestratorError::Superseded(project.to_string()));
        }
        if let Some(system) = snapshot.system {
            return Ok(system);
        }
        Err(OrchestratorError::OpenFailed {
            project: project.to_string(),
            reason: snapshot.open_error.unwrap_or_default(),
        })
    }

    fn send(&self, event: DatabaseEvent) -> Result<(), OrchestratorError> {
        self.events
            .send(event)
            .map_err(|_| OrchestratorError::DatabaseShutDown)
    }
}

struct DatabaseActor {
    store: Arc<dyn ItemStore>,
    refresh_interval: Duration,
    events: mpsc::UnboundedSender<DatabaseEvent>,
    snapshot: watch::Sender<DatabaseSnapshot>,
    list_task: Option<JoinHandle<()>>,
    relist_pending: bool,
    list_replies: Vec<ListReply>,
    queued_list_replies: Vec<ListReply>,
    timer: Option<JoinHandle<()>>,
    timer_generation: u64,
    feed_task: Option<JoinHandle<()>>,
    generation: u64,
    /// Records behind the current tree, kept to rebuild it on rename.
    records: Option<Vec<FlatRecord>>,
}

impl DatabaseActor {
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<DatabaseEvent>) {
        self.start_listing();
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
    }

    fn handle(&mut self, event: DatabaseEvent) {
        match event {
            DatabaseEvent::ListNow { reply } => self.on_list_now(reply),
            DatabaseEvent::RefreshDue { timer } => {
                if timer == self.timer_generation && self.phase() == DatabasePhase::Idle {
                    debug!("database: refresh timer fired");
                    self.start_listing();
                }
            }
            DatabaseEvent::Listed { result } => self.on_listed(result),
            DatabaseEvent::Switch { project, reply } => self.on_switch(project, reply),
            DatabaseEvent::FeedSnapshot {
                generation,
                records,
            } => self.on_feed_snapshot(generation, records),
            DatabaseEvent::FeedFailed { generation, reason } => {
                if generation != self.generation {
                    debug!("database: dropping stale feed failure generation={generation}");
                    return;
                }
                warn!("database: feed failed generation={generation}: {reason}");
                self.feed_task = None;
                self.snapshot.send_modify(|snapshot| {
                    snapshot.loading = false;
                    snapshot.open_error = Some(reason);
                });
            }
        }
    }

    fn phase(&self) -> DatabasePhase {
        self.snapshot.borrow().phase
    }

    fn on_list_now(&mut self, reply: Option<ListReply>) {
        if self.list_task.is_some() {
            // One listing at a time; run another right after this one.
            self.relist_pending = true;
            self.queued_list_replies.extend(reply);
            return;
        }
        self.list_replies.extend(reply);
        self.start_listing();
    }

    fn start_listing(&mut self) {
        self.cancel_timer();
        self.snapshot
            .send_modify(|snapshot| snapshot.phase = DatabasePhase::ListingDatabases);

        let store = Arc::clone(&self.store);
        let events = self.events.clone();
        self.list_task = Some(tokio::spawn(async move {
            let result = store.list_databases().await.map_err(|err| err.to_string());
            let _ = events.send(DatabaseEvent::Listed { result });
        }));
    }

    fn on_listed(&mut self, result: Result<Vec<DatabaseHandle>, String>) {
        self.list_task = None;

        let reply_result = match result {
            Ok(databases) => {
                debug!("database: listed count={}", databases.len());
                let databases = Arc::new(databases);
                self.snapshot.send_modify(|snapshot| {
                    snapshot.databases = Arc::clone(&databases);
                    snapshot.list_error = None;
                });
                self.reconcile_open(&databases);
                Ok(databases)
            }
            Err(reason) => {
                warn!("database: listing failed: {reason}");
                self.snapshot
                    .send_modify(|snapshot| snapshot.list_error = Some(reason.clone()));
                Err(OrchestratorError::ListFailed(reason))
            }
        };

        for reply in self.list_replies.drain(..) {
            let _ = reply.send(reply_result.clone());
        }

        if self.relist_pending {
            self.relist_pending = false;
            self.list_replies = std::mem::take(&mut self.queued_list_replies);
            self.start_listing();
        } else {
            self.enter_idle();
        }
    }

    /// Follows renames and removals of the open database.
    fn reconcile_open(&mut self, databases: &[DatabaseHandle]) {
        let open = self.snapshot.borrow().open.clone();
        let Some(open) = open else {
            return;
        };
        let Some(listed) = databases.iter().find(|db| db.project == open.project) else {
            info!("database: open project={} was removed, closing", open.project);
            self.close_open();
            return;
        };
        if listed.title == open.title {
            return;
        }

        debug!(
            "database: open project={} renamed, rebuilding tree",
            open.project
        );
        let system = self
            .records
            .as_ref()
            .map(|records| Arc::new(build(&listed.project, &listed.title, records)));
        let listed = listed.clone();
        self.snapshot.send_modify(|snapshot| {
            snapshot.open = Some(listed);
            if system.is_some() {
                snapshot.system = system;
            }
        });
    }

    fn close_open(&mut self) {
        if let Some(feed) = self.feed_task.take() {
            feed.abort();
        }
        self.generation += 1;
        self.records = None;
        self.snapshot.send_modify(|snapshot| {
            snapshot.open = None;
            snapshot.system = None;
            snapshot.loading = false;
            snapshot.open_error = None;
        });
    }

    fn enter_idle(&mut self) {
        self.snapshot
            .send_modify(|snapshot| snapshot.phase = DatabasePhase::Idle);
        self.cancel_timer();

        self.timer_generation += 1;
        let timer = self.timer_generation;
        let interval = self.refresh_interval;
        let events = self.events.clone();
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            let _ = events.send(DatabaseEvent::RefreshDue { timer });
        }));
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn on_switch(&mut self, project: String, reply: SwitchReply) {
        let handle = {
            let snapshot = self.snapshot.borrow();
            snapshot
                .databases
                .iter()
                .find(|db| db.project == project)
                .cloned()
        };
        let Some(handle) = handle else {
            warn!("database: switch rejected, project={project} is not listed");
            let _ = reply.send(Err(OrchestratorError::UnknownDatabase(project)));
            return;
        };

        if let Some(feed) = self.feed_task.take() {
            feed.abort();
        }
        self.generation += 1;
        self.records = None;
        let generation = self.generation;
        info!(
            "database: switching project={} generation={generation}",
            handle.project
        );

        self.snapshot.send_modify(|snapshot| {
            snapshot.open = Some(handle.clone());
            snapshot.system = None;
            snapshot.loading = true;
            snapshot.open_error = None;
        });

        let store = Arc::clone(&self.store);
        let events = self.events.clone();
        self.feed_task = Some(tokio::spawn(async move {
            let mut feed = match store.open_database(&handle).await {
                Ok(feed) => feed,
                Err(err) => {
                    let _ = events.send(DatabaseEvent::FeedFailed {
                        generation,
                        reason: err.to_string(),
                    });
                    return;
                }
            };
            while let Some(item) = feed.next().await {
                let event = match item {
                    Ok(records) => DatabaseEvent::FeedSnapshot {
                        generation,
                        records,
                    },
                    Err(err) => DatabaseEvent::FeedFailed {
                        generation,
                        reason: err.to_string(),
                    },
                };
                if events.send(event).is_err() {
                    return;
                }
            }
        }));

        let _ = reply.send(Ok(()));
    }

    fn on_feed_snapshot(&mut self, generation: u64, records: Vec<FlatRecord>) {
        if generation != self.generation {
            debug!("database: dropping stale feed snapshot generation={generation}");
            return;
        }
        let open = self.snapshot.borrow().open.clone();
        let Some(open) = open else {
            return;
        };

        let system = Arc::new(build(&open.project, &open.title, &records));
        debug!(
            "database: rebuilt tree project={} records={} generation={generation}",
            open.project,
            records.len()
        );
        self.records = Some(records);
        self.snapshot.send_modify(|snapshot| {
            snapshot.system = Some(system);
            snapshot.loading = false;
            snapshot.open_error = None;
        });
    }
}

impl Drop for DatabaseActor {
    fn drop(&mut self) {
        for task in [
            self.list_task.take(),
            self.timer.take(),
            self.feed_task.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }
    }
}

#[cfg(test)]
#[path = "tests/database_tests.rs"]
mod tests;
