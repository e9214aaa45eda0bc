use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
    #[error("database orchestrator has shut down")]
    DatabaseShutDown,
    #[error("session orchestrator has shut down")]
    SessionShutDown,
    #[error("session is not authenticated")]
    NotAuthenticated,
    #[error("database {0} is not listed")]
    UnknownDatabase(String),
    #[error("failed to list databases: {0}")]
    ListFailed(String),
    #[error("failed to open database {project}: {reason}")]
    OpenFailed { project: String, reason: String },
    #[error("switched away from database {0} before it finished loading")]
    Superseded(String),
}
