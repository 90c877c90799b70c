//! Error types for the PostgreSQL adapter.

use bench_core::SessionError;
use thiserror::Error;
use tokio_postgres::error::SqlState;

/// Errors that can occur while talking to PostgreSQL.
#[derive(Error, Debug)]
pub enum PostgreSQLError {
    /// PostgreSQL connection or query error.
    #[error("PostgreSQL error: {0}")]
    PostgreSQL(#[from] tokio_postgres::Error),

    /// TLS setup error.
    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    /// Reading the CA certificate failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A script references a parameter that does not exist.
    #[error("Unknown parameter '${0}'")]
    UnknownParameter(String),

    /// A script references a parameter that was not bound.
    #[error("Parameter '${0}' is not bound")]
    MissingParameter(String),

    /// A query returned an unexpected result shape.
    #[error("Unexpected result: {0}")]
    UnexpectedResult(String),
}

impl PostgreSQLError {
    /// Whether the server aborted the transaction because of a conflict.
    pub fn is_conflict(&self) -> bool {
        match self {
            PostgreSQLError::PostgreSQL(e) => matches!(
                e.code(),
                Some(code) if *code == SqlState::T_R_SERIALIZATION_FAILURE
                    || *code == SqlState::T_R_DEADLOCK_DETECTED
            ),
            _ => false,
        }
    }

    /// Whether the connection is unusable.
    pub fn is_connection(&self) -> bool {
        match self {
            PostgreSQLError::PostgreSQL(e) => {
                lost_connection(e.is_closed(), std::error::Error::source(e))
            }
            PostgreSQLError::Tls(_) | PostgreSQLError::Io(_) => true,
            _ => false,
        }
    }
}

/// A client error means the connection is gone only when the client saw it
/// close or the failure came from the socket. Decoding errors are not retried.
fn lost_connection(closed: bool, source: Option<&(dyn std::error::Error + 'static)>) -> bool {
    closed || source.is_some_and(|s| s.is::<std::io::Error>())
}

impl From<PostgreSQLError> for SessionError {
    fn from(error: PostgreSQLError) -> Self {
        let message = match &error {
            PostgreSQLError::PostgreSQL(e) => match e.as_db_error() {
                Some(db) => format!("{}: {}", db.code().code(), db.message()),
                None => e.to_string(),
            },
            other => other.to_string(),
        };

        if error.is_conflict() {
            SessionError::Aborted(message)
        } else if error.is_connection() {
            SessionError::Connection(message)
        } else {
            SessionError::Query(message)
        }
    }
}
