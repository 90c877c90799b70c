//! Interface to the database client.
//!
//! The engine never talks to a database directly. A client adapter provides a
//! [`SessionPool`] that hands out [`Session`]s, owns their synchronization and
//! defines the retry policy for pooled execution.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::SessionError;
use crate::params::Parameters;

/// Server-side execution statistics of one transaction.
///
/// A value of zero means the server did not report that statistic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryStats {
    pub total_duration_us: i64,
    pub total_cpu_us: i64,
}

/// An exclusively held database session.
#[async_trait]
pub trait Session: Send {
    /// Run `script` as a single committed transaction.
    ///
    /// Implementations begin a transaction, submit the script with the given
    /// named parameters, drain every result set and commit. Statistics are
    /// only available after all results have been consumed.
    async fn execute_in_transaction(
        &mut self,
        script: &str,
        params: &Parameters,
    ) -> Result<QueryStats, SessionError>;
}

/// A shared pool of sessions.
#[async_trait]
pub trait SessionPool: Send + Sync {
    type Session: Session;

    /// Borrow a session, waiting if the pool is exhausted.
    async fn acquire(&self) -> Result<Self::Session, SessionError>;

    /// Return a session to the pool.
    async fn release(&self, session: Self::Session);

    /// Retry policy applied to operations run in pooled mode.
    fn retry_policy(&self) -> RetryPolicy;

    /// Execute a statement batch outside of any job, retrying per the pool's policy.
    async fn execute_with_retries(&self, sql: &str) -> Result<(), SessionError>;

    /// Run a query returning a single integer, retrying per the pool's policy.
    async fn query_count_with_retries(&self, sql: &str) -> Result<i64, SessionError>;
}

/// Exponential backoff retry policy for pooled operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Whether a failed attempt (0-based) should be followed by another one.
    pub fn should_retry(&self, error: &SessionError, attempt: u32) -> bool {
        error.is_retryable() && attempt + 1 < self.max_attempts
    }

    /// Delay before the attempt following `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}
