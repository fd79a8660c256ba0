//! Error types for the search engine.

use std::fmt;
use thiserror::Error;

/// Error type returned by problem callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type returned by problem callbacks.
pub type CallbackResult<T> = Result<T, BoxError>;

/// Identifies which problem callback failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Callback {
    /// Successor generation.
    Successors,
    /// Partial validity predicate.
    IsValid,
    /// Acceptance predicate.
    IsComplete,
}

impl fmt::Display for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callback::Successors => write!(f, "successors"),
            Callback::IsValid => write!(f, "is_valid"),
            Callback::IsComplete => write!(f, "is_complete"),
        }
    }
}

/// Errors detected before any worker runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing `{0}` callback")]
    MissingCallback(Callback),
    #[error("worker count must be at least 1")]
    NoWorkers,
    #[error("search is already running")]
    AlreadyRunning,
    #[error("no worker with id {worker_id} in the current pool of {pool_size}")]
    UnknownWorker { worker_id: usize, pool_size: usize },
    #[error("failed to spawn worker {worker_id}: {source}")]
    Spawn {
        worker_id: usize,
        #[source]
        source: std::io::Error,
    },
}

/// Errors surfaced by the orchestrator.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("`{callback}` callback failed on partial solution {partial}: {source}")]
    Callback {
        callback: Callback,
        /// Debug rendering of the partial solution that triggered the failure.
        partial: String,
        #[source]
        source: BoxError,
    },
    #[error("worker {worker_id} panicked: {message}")]
    WorkerPanicked { worker_id: usize, message: String },
}

impl EngineError {
    pub(crate) fn callback(callback: Callback, partial: &impl fmt::Debug, source: BoxError) -> Self {
        EngineError::Callback {
            callback,
            partial: format!("{partial:?}"),
            source,
        }
    }

    /// The failing callback, if this is a callback error.
    pub fn failed_callback(&self) -> Option<Callback> {
        match self {
            EngineError::Callback { callback, .. } => Some(*callback),
            _ => None,
        }
    }
}
