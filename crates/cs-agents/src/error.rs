//! Error types for workers and the scheduler

use cs_customers::StoreError;
use thiserror::Error;

/// Worker and scheduler error types.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Customer store failure while reading signals.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// No worker with that name is registered.
    #[error("Unknown worker: {0}")]
    UnknownWorker(String),

    /// The worker's previous run has not finished.
    #[error("Worker {0} is already running")]
    AlreadyRunning(String),
}

/// Result type for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;
