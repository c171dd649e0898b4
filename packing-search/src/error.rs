//! Error types for the packing search.

use thiserror::Error;

/// Errors that can occur while setting up or running a packing search.
#[derive(Error, Debug)]
pub enum PackingError {
    /// Graph validation failed
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    /// Search settings are inconsistent
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// Warm-start packing is out of range or infeasible
    #[error("Invalid seed packing: {0}")]
    InvalidSeed(String),

    /// Bound oracle failed (recoverable, the node falls back to the combinatorial bound)
    #[error("Bound oracle failed: {0}")]
    Oracle(String),

    /// Bound oracle is already serving another branch
    #[error("Bound oracle is busy")]
    OracleBusy,

    /// No oracle registered under the requested key
    #[error("Unknown bound oracle: {0}")]
    UnknownOracle(String),

    /// Worker thread could not be spawned or fed
    #[error("Thread pool failure: {0}")]
    ThreadPool(String),

    /// A node expansion panicked on a worker thread
    #[error("Worker panicked while expanding node {node_id}: {message}")]
    WorkerPanicked {
        /// Id of the node whose expansion panicked.
        node_id: u64,
        /// Panic payload, if it was a string.
        message: String,
    },

    /// I/O error (LP subprocess files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PackingError {
    /// Returns true if the search can continue after this error.
    ///
    /// Oracle failures (including I/O around the LP subprocess) only affect
    /// the bound of a single node.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PackingError::Oracle(_) | PackingError::OracleBusy | PackingError::Io(_)
        )
    }
}

/// Result type for packing operations.
pub type PackingResult<T> = Result<T, PackingError>;
