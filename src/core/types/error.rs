//! Typed errors for the sampling engine

use thiserror::Error;

/// Identifier of a pooled worker thread.
pub type WorkerId = usize;

/// Error type shared by the resolver, workers, and batch layers.
///
/// Every variant is scoped to a single request or request group; a batch call
/// never raises, it carries these inside per-request results.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Module not found in {process}: {module}")]
    ModuleNotFound { process: String, module: String },

    #[error("Pointer chain broken at level {level}: null pointer")]
    NullPointer { level: usize },

    #[error("Invalid memory address: {0}")]
    InvalidAddress(String),

    #[error("Unsupported value type: {0}")]
    UnsupportedType(String),

    #[error("Worker {0} timed out")]
    WorkerTimeout(WorkerId),

    #[error("Worker {worker} crashed: {reason}")]
    WorkerCrash { worker: WorkerId, reason: String },

    #[error("Sampling engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Failed to read memory at {address}: {reason}")]
    ReadFailed { address: String, reason: String },
}

/// Result alias used throughout the engine.
pub type EngineResult<T> = Result<T, ReadError>;

impl ReadError {
    pub fn validation(reason: impl Into<String>) -> Self {
        ReadError::Validation(reason.into())
    }

    pub fn module_not_found(process: impl Into<String>, module: impl Into<String>) -> Self {
        ReadError::ModuleNotFound {
            process: process.into(),
            module: module.into(),
        }
    }

    pub fn read_failed(address: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        ReadError::ReadFailed {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    pub fn worker_crash(worker: WorkerId, reason: impl Into<String>) -> Self {
        ReadError::WorkerCrash {
            worker,
            reason: reason.into(),
        }
    }

    /// True for failures that should evict the worker that produced them.
    pub fn is_worker_fatal(&self) -> bool {
        matches!(
            self,
            ReadError::WorkerTimeout(_) | ReadError::WorkerCrash { .. }
        )
    }
}
