//! In-memory fakes for the store and session provider.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;
use shared::domain::{DatabaseHandle, FlatRecord, Identity, ItemKind};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::{ItemStore, RecordFeed, SessionProvider, SessionResult};

type FeedSender = mpsc::UnboundedSender<Result<Vec<FlatRecord>>>;

#[derive(Default)]
pub(crate) struct FakeStore {
    databases: Mutex<Vec<DatabaseHandle>>,
    records: Mutex<HashMap<String, Vec<FlatRecord>>>,
    feeds: Mutex<Vec<(String, FeedSender)>>,
    list_delay: Mutex<Duration>,
    pub list_calls: AtomicUsize,
    pub lists_in_flight: AtomicUsize,
    pub max_lists_in_flight: AtomicUsize,
    pub open_calls: AtomicUsize,
    pub write_calls: AtomicUsize,
    pub hold_initial: AtomicBool,
    pub fail_list: AtomicBool,
    pub fail_open: AtomicBool,
    pub fail_writes: AtomicBool,
}

impl FakeStore {
    pub fn with_databases(databases: &[(&str, &str)]) -> Self {
        let store = Self::default();
        for (project, title) in databases {
            store.add_database(project, title);
        }
        store
    }

    pub fn add_database(&self, project: &str, title: &str) {
        self.databases
            .lock()
            .expect("databases lock")
            .push(DatabaseHandle::new(project, title));
        self.records
            .lock()
            .expect("records lock")
            .entry(project.to_string())
            .or_default();
    }

    pub fn remove_database(&self, project: &str) {
        self.databases
            .lock()
            .expect("databases lock")
            .retain(|db| db.project != project);
    }

    pub fn is_listed(&self, project: &str) -> bool {
        self.databases
            .lock()
            .expect("databases lock")
            .iter()
            .any(|db| db.project == project)
    }

    pub fn seed(&self, project: &str, records: Vec<FlatRecord>) {
        self.records
            .lock()
            .expect("records lock")
            .insert(project.to_string(), records);
    }

    pub fn records(&self, project: &str) -> Vec<FlatRecord> {
        self.records
            .lock()
            .expect("records lock")
            .get(project)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_list_delay(&self, delay: Duration) {
        *self.list_delay.lock().expect("delay lock") = delay;
    }

    pub fn feed_count(&self) -> usize {
        self.feeds.lock().expect("feeds lock").len()
    }

    /// Pushes a snapshot into the `index`-th feed ever opened.
    pub fn push_feed(&self, index: usize, records: Vec<FlatRecord>) -> bool {
        let feeds = self.feeds.lock().expect("feeds lock");
        feeds
            .get(index)
            .is_some_and(|(_, tx)| tx.send(Ok(records)).is_ok())
    }

    fn notify(&self, project: &str) {
        let records = self.records(project);
        let feeds = self.feeds.lock().expect("feeds lock");
        for (_, tx) in feeds.iter().filter(|(open, _)| open == project) {
            let _ = tx.send(Ok(records.clone()));
        }
    }
}

#[async_trait]
impl ItemStore for FakeStore {
    async fn list_databases(&self) -> Result<Vec<DatabaseHandle>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.lists_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_lists_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);

        let delay = *self.list_delay.lock().expect("delay lock");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.lists_in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_list.load(Ordering::SeqCst) {
            return Err(anyhow!("list timed out"));
        }
        Ok(self.databases.lock().expect("databases lock").clone())
    }

    async fn open_database(&self, handle: &DatabaseHandle) -> Result<RecordFeed> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(anyhow!("connection reset"));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if !self.hold_initial.load(Ordering::SeqCst) {
            let _ = tx.send(Ok(self.records(&handle.project)));
        }
        self.feeds
            .lock()
            .expect("feeds lock")
            .push((handle.project.clone(), tx));
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn create_database(&self, handle: DatabaseHandle) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("network unreachable"));
        }
        self.add_database(&handle.project, &handle.title);
        Ok(())
    }

    async fn write_record(&self, project: &str, record: FlatRecord) -> Result<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("network unreachable"));
        }
        {
            let mut records = self.records.lock().expect("records lock");
            let entries = records.entry(project.to_string()).or_default();
            entries.retain(|existing| {
                !(existing.kind == record.kind && existing.number == record.number)
            });
            entries.push(record);
        }
        self.notify(project);
        Ok(())
    }

    async fn delete_record(&self, project: &str, kind: ItemKind, number: &str) -> Result<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("network unreachable"));
        }
        {
            let mut records = self.records.lock().expect("records lock");
            if let Some(entries) = records.get_mut(project) {
                entries.retain(|existing| !(existing.kind == kind && existing.number == number));
            }
        }
        self.notify(project);
        Ok(())
    }
}

pub(crate) struct FakeProvider {
    outcomes: Mutex<VecDeque<Result<SessionResult, String>>>,
    pub establish_calls: AtomicUsize,
    pub sign_out_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new(outcomes: Vec<Result<SessionResult, String>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            establish_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
        }
    }

    pub fn authenticated(user: &str) -> Result<SessionResult, String> {
        Ok(SessionResult::Authenticated {
            identity: Identity {
                user: user.to_string(),
            },
        })
    }
}

#[async_trait]
impl SessionProvider for FakeProvider {
    async fn establish_session(&self) -> Result<SessionResult> {
        self.establish_calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .outcomes
            .lock()
            .expect("outcomes lock")
            .pop_front()
            .unwrap_or_else(|| Self::authenticated("alice"));
        next.map_err(|reason| anyhow!(reason))
    }

    async fn sign_out(&self) -> Result<()> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) fn record(kind: ItemKind, number: &str, title: &str) -> FlatRecord {
    FlatRecord::new(kind, number, title)
}

/// Lets aborted tasks get dropped on the current-thread test runtime.
pub(crate) async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}
