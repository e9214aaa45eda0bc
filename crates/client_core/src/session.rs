use std::sync::Arc;

use shared::domain::Identity;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    database::{DatabaseClient, DatabaseOrchestrator},
    error::OrchestratorError,
    mutation::MutationGate,
    SessionContext, SessionResult,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Establishing,
    Authenticated { identity: Identity },
    Unauthenticated,
    SigningOut,
    /// Terminal: the provider failed while establishing a session.
    Fatal { reason: String },
}

impl SessionState {
    pub fn is_settled(&self) -> bool {
        !matches!(self, SessionState::Establishing | SessionState::SigningOut)
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionState::Authenticated { identity } => Some(identity),
            _ => None,
        }
    }
}

enum SessionEvent {
    Established {
        attempt: u64,
        result: Result<SessionResult, String>,
    },
    SignIn,
    SignOut,
    SignedOut {
        attempt: u64,
        result: Result<(), String>,
    },
}

/// Top-level lifecycle actor. Holds at most one [`DatabaseOrchestrator`],
/// alive exactly while the session is authenticated.
pub struct SessionOrchestrator {
    events: mpsc::UnboundedSender<SessionEvent>,
    state: watch::Receiver<SessionState>,
    database: watch::Receiver<Option<DatabaseClient>>,
    task: JoinHandle<()>,
}

impl SessionOrchestrator {
    pub fn spawn(context: SessionContext) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Establishing);
        let (database_tx, database_rx) = watch::channel(None);

        let actor = SessionActor {
            context,
            events: events_tx.clone(),
            state: state_tx,
            database: database_tx,
            child: None,
            attempt: 0,
            pending: None,
        };
        let task = tokio::spawn(actor.run(events_rx));

        Self {
            events: events_tx,
            state: state_rx,
            database: database_rx,
            task,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// The live database orchestrator, if the session is authenticated.
    pub fn database(&self) -> Option<DatabaseClient> {
        self.database.borrow().clone()
    }

    pub fn mutation_gate(&self) -> Option<MutationGate> {
        self.database().map(|database| database.mutation_gate())
    }

    pub fn sign_in(&self) -> Result<(), OrchestratorError> {
        self.send(SessionEvent::SignIn)
    }

    pub fn sign_out(&self) -> Result<(), OrchestratorError> {
        self.send(SessionEvent::SignOut)
    }

    /// Waits until the session is not establishing or signing out.
    pub async fn wait_until_settled(&self) -> Result<SessionState, OrchestratorError> {
        let mut rx = self.state.clone();
        let state = rx
            .wait_for(SessionState::is_settled)
            .await
            .map_err(|_| OrchestratorError::SessionShutDown)?
            .clone();
        Ok(state)
    }

    /// Waits for an authenticated session and returns its database client.
    pub async fn authenticated_database(&self) -> Result<DatabaseClient, OrchestratorError> {
        match self.wait_until_settled().await? {
            SessionState::Authenticated { .. } => {
                self.database().ok_or(OrchestratorError::NotAuthenticated)
            }
            _ => Err(OrchestratorError::NotAuthenticated),
        }
    }

    pub fn shutdown(self) {
        drop(self);
    }

    fn send(&self, event: SessionEvent) -> Result<(), OrchestratorError> {
        self.events
            .send(event)
            .map_err(|_| OrchestratorError::SessionShutDown)
    }
}

impl Drop for SessionOrchestrator {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct SessionActor {
    context: SessionContext,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: watch::Sender<SessionState>,
    database: watch::Sender<Option<DatabaseClient>>,
    child: Option<DatabaseOrchestrator>,
    attempt: u64,
    pending: Option<JoinHandle<()>>,
}

impl SessionActor {
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
        self.establish();
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
    }

    fn current(&self) -> SessionState {
        self.state.borrow().clone()
    }

    fn handle(&mut self, event: SessionEvent) {
        if let SessionState::Fatal { .. } = self.current() {
            debug!("session: ignoring event in fatal state");
            return;
        }

        match event {
            SessionEvent::Established { attempt, result } => {
                if attempt != self.attempt || self.current() != SessionState::Establishing {
                    return;
                }
                self.pending = None;
                match result {
                    Ok(SessionResult::Authenticated { identity }) => {
                        self.enter_authenticated(identity)
                    }
                    Ok(SessionResult::NotAuthenticated) => {
                        info!("session: no active session");
                        self.state.send_replace(SessionState::Unauthenticated);
                    }
                    Err(reason) => {
                        error!("session: establishing failed: {reason}");
                        self.teardown_child();
                        self.state.send_replace(SessionState::Fatal { reason });
                    }
                }
            }
            SessionEvent::SignIn => {
                if self.current() == SessionState::Unauthenticated {
                    self.establish();
                }
            }
            SessionEvent::SignOut => {
                if let SessionState::Authenticated { .. } = self.current() {
                    self.begin_sign_out();
                }
            }
            SessionEvent::SignedOut { attempt, result } => {
                if attempt != self.attempt || self.current() != SessionState::SigningOut {
                    return;
                }
                self.pending = None;
                if let Err(reason) = result {
                    warn!("session: provider sign-out failed: {reason}");
                }
                info!("session: signed out");
                self.state.send_replace(SessionState::Unauthenticated);
            }
        }
    }

    fn establish(&mut self) {
        self.attempt += 1;
        let attempt = self.attempt;
        self.state.send_replace(SessionState::Establishing);

        let provider = Arc::clone(&self.context.provider);
        let events = self.events.clone();
        self.pending = Some(tokio::spawn(async move {
            let result = provider
                .establish_session()
                .await
                .map_err(|err| format!("{err:#}"));
            let _ = events.send(SessionEvent::Established { attempt, result });
        }));
    }

    fn enter_authenticated(&mut self, identity: Identity) {
        info!("session: authenticated user={}", identity.user);
        self.teardown_child();
        let child = DatabaseOrchestrator::spawn(
            Arc::clone(&self.context.store),
            self.context.refresh_interval,
        );
        self.database.send_replace(Some(child.client()));
        self.child = Some(child);
        self.state
            .send_replace(SessionState::Authenticated { identity });
    }

    fn begin_sign_out(&mut self) {
        self.teardown_child();
        self.attempt += 1;
        let attempt = self.attempt;
        self.state.send_replace(SessionState::SigningOut);

        let provider = Arc::clone(&self.context.provider);
        let events = self.events.clone();
        self.pending = Some(tokio::spawn(async move {
            let result = provider.sign_out().await.map_err(|err| format!("{err:#}"));
            let _ = events.send(SessionEvent::SignedOut { attempt, result });
        }));
    }

    fn teardown_child(&mut self) {
        if let Some(child) = self.child.take() {
            debug!("session: tearing down database orchestrator");
            self.database.send_replace(None);
            child.shutdown();
        }
    }
}

impl Drop for SessionActor {
    fn drop(&mut self) {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
        self.teardown_child();
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
