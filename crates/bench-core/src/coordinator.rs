//! Runs the jobs of one worker process concurrently and waits for all of them.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{BenchError, Result};
use crate::job::{ExecutionMode, JobLoop, JobOperation, JobState};
use crate::partitioner::{describe_ranges, split_range, BidRange};
use crate::session::SessionPool;

/// What happens to the remaining jobs once one job fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Let every other job run to completion.
    #[default]
    Wait,
    /// Stop the other jobs before their next iteration.
    StopSiblings,
}

/// Totals of a coordinated run in which no job failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorReport {
    pub jobs: usize,
    pub completed: usize,
    pub stopped: usize,
    pub iterations: u64,
}

/// Split a process range into one range per job.
pub fn plan_jobs(range: BidRange, jobs: usize) -> Result<Vec<BidRange>> {
    let ranges = split_range(range, jobs)?;
    info!("{}", describe_ranges("Job", &ranges));
    Ok(ranges)
}

pub struct WorkerCoordinator {
    mode: ExecutionMode,
    policy: FailurePolicy,
}

impl WorkerCoordinator {
    pub fn new(mode: ExecutionMode, policy: FailurePolicy) -> Self {
        Self { mode, policy }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Run every operation as its own job and wait until all are terminal.
    ///
    /// Jobs are cooperatively scheduled on the calling task. Failed jobs are
    /// reported together as [`BenchError::JobsFailed`].
    pub async fn run<P, O>(&self, pool: &P, operations: Vec<O>) -> Result<CoordinatorReport>
    where
        P: SessionPool,
        O: JobOperation,
    {
        let cancel = CancellationToken::new();
        let mut jobs: Vec<JobLoop<O>> = operations
            .into_iter()
            .enumerate()
            .map(|(id, operation)| JobLoop::new(id + 1, operation))
            .collect();
        let total = jobs.len();

        let results = join_all(jobs.iter_mut().map(|job| {
            let cancel = &cancel;
            async move {
                let result = job.run(pool, self.mode, cancel).await;
                if result.is_err() && self.policy == FailurePolicy::StopSiblings {
                    cancel.cancel();
                }
                result
            }
        }))
        .await;

        let mut report = CoordinatorReport {
            jobs: total,
            ..Default::default()
        };
        let mut errors = Vec::new();
        for (job, result) in jobs.iter().zip(results) {
            match result {
                Ok(outcome) => {
                    report.iterations += outcome.iterations;
                    match outcome.state {
                        JobState::Stopped => report.stopped += 1,
                        _ => report.completed += 1,
                    }
                }
                Err(e) => errors.push(format!("job #{}: {}", job.id(), e)),
            }
        }

        if !errors.is_empty() {
            warn!(
                "{} of {} jobs failed ({} stopped)",
                errors.len(),
                total,
                report.stopped
            );
            return Err(BenchError::JobsFailed {
                failed: errors.len(),
                total,
                errors,
            });
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_jobs() {
        let ranges = plan_jobs(BidRange::new(11, 20).unwrap(), 3).unwrap();
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[0], BidRange { from: 11, to: 13 });
        assert_eq!(ranges[2].to, 20);
    }

    #[test]
    fn test_failure_policy_serde() {
        assert_eq!(FailurePolicy::default(), FailurePolicy::Wait);
        let json = serde_json::to_string(&FailurePolicy::StopSiblings).unwrap();
        assert_eq!(json, "\"stop-siblings\"");
    }
}
