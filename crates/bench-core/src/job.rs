//! Job loop: repeatedly runs one operation against the session pool.
//!
//! A job owns a bid range and an iteration count. How it consumes sessions is
//! chosen by [`ExecutionMode`]:
//!
//! - **Pooled**: every iteration borrows a session from the pool and retries
//!   under the pool's [`RetryPolicy`](crate::session::RetryPolicy).
//! - **Single session**: one session is held for the job's whole lifetime and
//!   iterations run strictly in order on it, without retries.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{BenchError, Result, SessionError};
use crate::partitioner::BidRange;
use crate::session::{Session, SessionPool};

/// How a job consumes database sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    #[default]
    Pooled,
    SingleSession,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Pooled => write!(f, "pooled"),
            ExecutionMode::SingleSession => write!(f, "single session"),
        }
    }
}

/// A unit of work executed once per iteration of a job.
#[async_trait(?Send)]
pub trait JobOperation {
    /// Short name used in log lines.
    fn label(&self) -> &str;

    /// The bid range this job is restricted to.
    fn range(&self) -> BidRange;

    /// Number of iterations the job runs.
    fn iterations(&self) -> u64;

    /// Execute iteration `iteration` (0-based) on `session`.
    async fn execute<S: Session>(
        &self,
        session: &mut S,
        iteration: u64,
    ) -> std::result::Result<(), SessionError>;
}

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running,
    Completed,
    Failed,
    /// Stopped early because a sibling job failed.
    Stopped,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Stopped
        )
    }
}

/// Result of a job that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOutcome {
    /// Iterations that ran to completion, preheat included.
    pub iterations: u64,
    pub state: JobState,
}

/// Drives one [`JobOperation`] from `Idle` to a terminal state.
pub struct JobLoop<O> {
    id: usize,
    operation: O,
    state: JobState,
}

impl<O: JobOperation> JobLoop<O> {
    pub fn new(id: usize, operation: O) -> Self {
        Self {
            id,
            operation,
            state: JobState::Idle,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn operation(&self) -> &O {
        &self.operation
    }

    pub fn into_operation(self) -> O {
        self.operation
    }

    /// Run all iterations in the given mode.
    ///
    /// `cancel` is checked before every iteration; a cancelled job finishes in
    /// [`JobState::Stopped`] after releasing its session.
    pub async fn run<P: SessionPool>(
        &mut self,
        pool: &P,
        mode: ExecutionMode,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome> {
        self.state = JobState::Running;
        info!(
            "{} #{} {} started ({} mode, {} iterations)",
            self.operation.label(),
            self.id,
            self.operation.range(),
            mode,
            self.operation.iterations()
        );

        let progress = match mode {
            ExecutionMode::Pooled => self.run_pooled(pool, cancel).await,
            ExecutionMode::SingleSession => self.run_single_session(pool, cancel).await,
        };

        match progress {
            Ok(progress) => {
                self.state = if progress.stopped {
                    JobState::Stopped
                } else {
                    JobState::Completed
                };
                if progress.stopped {
                    warn!(
                        "{} #{} {} stopped after {} iterations",
                        self.operation.label(),
                        self.id,
                        self.operation.range(),
                        progress.iterations
                    );
                } else {
                    info!(
                        "{} #{} {} completed",
                        self.operation.label(),
                        self.id,
                        self.operation.range()
                    );
                }
                Ok(JobOutcome {
                    iterations: progress.iterations,
                    state: self.state,
                })
            }
            Err(e) => {
                self.state = JobState::Failed;
                error!(
                    "{} #{} {} failed: {}",
                    self.operation.label(),
                    self.id,
                    self.operation.range(),
                    e
                );
                Err(e)
            }
        }
    }

    async fn run_pooled<P: SessionPool>(
        &self,
        pool: &P,
        cancel: &CancellationToken,
    ) -> Result<Progress> {
        let policy = pool.retry_policy();
        let mut progress = Progress::default();

        for iteration in 0..self.operation.iterations() {
            if cancel.is_cancelled() {
                progress.stopped = true;
                break;
            }

            let mut attempt = 0;
            loop {
                let result = match pool.acquire().await {
                    Ok(mut session) => {
                        let result = self.operation.execute(&mut session, iteration).await;
                        pool.release(session).await;
                        result
                    }
                    Err(e) => Err(e),
                };

                match result {
                    Ok(()) => break,
                    Err(e) if policy.should_retry(&e, attempt) => {
                        let delay = policy.backoff(attempt);
                        debug!(
                            "Job #{} iteration {} attempt {} failed, retrying in {:?}: {}",
                            self.id,
                            iteration,
                            attempt + 1,
                            delay,
                            e
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    Err(e) => return Err(BenchError::Transaction(e)),
                }
            }
            progress.iterations += 1;
        }

        Ok(progress)
    }

    async fn run_single_session<P: SessionPool>(
        &self,
        pool: &P,
        cancel: &CancellationToken,
    ) -> Result<Progress> {
        let mut session = pool.acquire().await?;
        let result = self.run_on_session(&mut session, cancel).await;
        pool.release(session).await;
        result
    }

    async fn run_on_session<S: Session>(
        &self,
        session: &mut S,
        cancel: &CancellationToken,
    ) -> Result<Progress> {
        let mut progress = Progress::default();
        for iteration in 0..self.operation.iterations() {
            if cancel.is_cancelled() {
                progress.stopped = true;
                break;
            }
            self.operation.execute(session, iteration).await?;
            progress.iterations += 1;
        }
        Ok(progress)
    }
}

#[derive(Debug, Default)]
struct Progress {
    iterations: u64,
    stopped: bool,
}
