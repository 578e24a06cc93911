//! Error types
//!
//! Two layers: [`RuntimeError`] is whatever the container runtime reported,
//! [`EngineError`] is what the facade hands back to its callers. Each propagating
//! engine operation gets its own variant carrying the runtime error as its source.

use thiserror::Error;

/// Failures reported by the container runtime collaborator
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("{0}")]
    Api(#[from] bollard::errors::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error frame received inside a progress stream (build, pull, push)
    #[error("{0}")]
    Stream(String),

    /// Rejected locally before anything was sent
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The runtime answered but left out something the caller needs
    #[error("runtime response is missing {0}")]
    MissingField(&'static str),
}

/// Engine error types
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Malformed image identifier: {0:?}")]
    MalformedIdentifier(String),

    #[error("Invalid port specification: {0}")]
    InvalidPortSpec(String),

    #[error("Failed to connect to the container runtime: {0}")]
    Connect(#[source] RuntimeError),

    #[error("Image build failed: {0}")]
    BuildFailed(#[source] RuntimeError),

    #[error("Image pull failed: {0}")]
    PullFailed(#[source] RuntimeError),

    #[error("Image push failed: {0}")]
    PushFailed(#[source] RuntimeError),

    #[error("Container start failed: {0}")]
    StartFailed(#[source] RuntimeError),

    #[error("Exec failed: {0}")]
    ExecFailed(#[source] RuntimeError),

    #[error("Container commit failed: {0}")]
    CommitFailed(#[source] RuntimeError),

    #[error("Listing containers failed: {0}")]
    ListFailed(#[source] RuntimeError),
}

impl EngineError {
    /// Short name of the operation that produced this error, used as a metrics label
    pub fn operation(&self) -> &'static str {
        match self {
            EngineError::MalformedIdentifier(_) => "parse",
            EngineError::InvalidPortSpec(_) => "ports",
            EngineError::Connect(_) => "connect",
            EngineError::BuildFailed(_) => "build",
            EngineError::PullFailed(_) => "pull",
            EngineError::PushFailed(_) => "push",
            EngineError::StartFailed(_) => "start",
            EngineError::ExecFailed(_) => "exec",
            EngineError::CommitFailed(_) => "commit",
            EngineError::ListFailed(_) => "list",
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
