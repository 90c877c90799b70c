//! Error types for the benchmark engine.

use thiserror::Error;

/// Errors raised by a database session or session pool.
///
/// Database client adapters convert their native errors into this type so the
/// job loop can decide whether an operation is worth retrying.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The connection could not be established or was lost mid-operation.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The transaction was aborted by the server (serialization failure, deadlock).
    #[error("Transaction aborted: {0}")]
    Aborted(String),

    /// The query itself failed (syntax, constraint violation, missing parameter).
    #[error("Query error: {0}")]
    Query(String),

    /// The pool has been shut down.
    #[error("Session pool is closed")]
    PoolClosed,
}

impl SessionError {
    /// Whether a pool may transparently retry the operation on a fresh session.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::Connection(_) | SessionError::Aborted(_))
    }
}

/// Errors that can occur while planning or running a benchmark.
#[derive(Error, Debug)]
pub enum BenchError {
    /// A required connection parameter is missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An argument violates an operation's preconditions.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested bid range exceeds the initialized branches.
    #[error(
        "Scale {required} exceeds the number of initialized branches ({available}). \
         Please run 'init' with scale >= {required} or reduce the scale parameter."
    )]
    RangeExceeded { required: i64, available: i64 },

    /// A single transaction failed.
    #[error("Transaction failed: {0}")]
    Transaction(#[from] SessionError),

    /// One or more jobs of a process failed.
    #[error("{failed} of {total} jobs failed: {}", errors.join("; "))]
    JobsFailed {
        failed: usize,
        total: usize,
        errors: Vec<String>,
    },

    /// A worker process failed outside of any job.
    #[error("Process error: {0}")]
    Process(String),
}

impl BenchError {
    /// Errors that must abort the whole run before any load is generated.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BenchError::Config(_) | BenchError::InvalidArgument(_) | BenchError::RangeExceeded { .. }
        )
    }
}

/// Result type alias for engine operations.
pub type Result<T, E = BenchError> = std::result::Result<T, E>;
