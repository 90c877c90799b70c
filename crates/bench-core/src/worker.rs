//! Worker process entry: the task a process receives and the report it returns.
//!
//! Both messages are plain JSON so a parent can hand a task to a child
//! process over stdin and read the report back from stdout.

use std::cell::RefCell;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span, Instrument};

use crate::config::ConnectionConfig;
use crate::coordinator::{plan_jobs, FailurePolicy, WorkerCoordinator};
use crate::error::{BenchError, Result};
use crate::executor::TransactionExecutor;
use crate::job::ExecutionMode;
use crate::metrics::MetricsCollector;
use crate::partitioner::BidRange;
use crate::session::SessionPool;
use crate::validate::validate_scale;
use crate::workload::{ScriptCatalog, ScriptSource};

/// Self-contained description of one worker process's share of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerTask {
    pub process_id: usize,
    pub connection: ConnectionConfig,
    /// Branches this process is restricted to.
    pub range: BidRange,
    /// Global scale of the run, validated against the initialized branches.
    pub scale: i64,
    pub jobs: usize,
    pub transactions: u64,
    #[serde(default)]
    pub preheat: u64,
    #[serde(default)]
    pub mode: ExecutionMode,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default)]
    pub settle_delay: Duration,
    pub scripts: Vec<ScriptSource>,
}

/// What a worker process hands back to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub process_id: usize,
    pub metrics: MetricsCollector,
    /// Set when the process could not start generating load.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatal_error: Option<String>,
}

impl WorkerReport {
    /// Report for a process that produced no usable metrics.
    pub fn failed(process_id: usize, message: impl Into<String>) -> Self {
        let mut metrics = MetricsCollector::new();
        metrics.record_unhandled_error(message);
        Self {
            process_id,
            metrics,
            fatal_error: None,
        }
    }

    pub fn fatal(process_id: usize, error: &BenchError) -> Self {
        Self {
            process_id,
            metrics: MetricsCollector::new(),
            fatal_error: Some(error.to_string()),
        }
    }
}

/// Run one worker process's share of the workload against `pool`.
///
/// Fatal errors (invalid scripts, insufficient scale) are returned in
/// [`WorkerReport::fatal_error`]. Any other error, from the pre-flight
/// count query or from the jobs, lands in the collector as an unhandled
/// error so the run still produces a summary.
pub async fn run_worker<P: SessionPool>(pool: &P, task: &WorkerTask) -> WorkerReport {
    let span = info_span!("worker", process_id = task.process_id);
    async {
        match run_jobs(pool, task).await {
            Ok(metrics) => WorkerReport {
                process_id: task.process_id,
                metrics,
                fatal_error: None,
            },
            Err(e) if e.is_fatal() => {
                error!("Worker {} failed: {}", task.process_id, e);
                WorkerReport::fatal(task.process_id, &e)
            }
            Err(e) => {
                error!("Worker {} stopped: {}", task.process_id, e);
                WorkerReport::failed(task.process_id, format!("process {}: {e}", task.process_id))
            }
        }
    }
    .instrument(span)
    .await
}

async fn run_jobs<P: SessionPool>(pool: &P, task: &WorkerTask) -> Result<MetricsCollector> {
    let catalog = ScriptCatalog::from_sources(&task.scripts, &task.connection.table_folder)?;

    if !task.settle_delay.is_zero() {
        tokio::time::sleep(task.settle_delay).await;
    }

    validate_scale(pool, &task.connection.table_folder, task.scale).await?;

    let ranges = plan_jobs(task.range, task.jobs)?;
    let metrics = RefCell::new(MetricsCollector::new());
    let executors: Vec<TransactionExecutor<'_>> = ranges
        .into_iter()
        .map(|range| {
            TransactionExecutor::new(range, task.transactions, &catalog, &metrics)
                .with_preheat(task.preheat)
        })
        .collect();

    let coordinator = WorkerCoordinator::new(task.mode, task.failure_policy);
    match coordinator.run(pool, executors).await {
        Ok(report) => info!(
            "Worker {} finished {} jobs ({} iterations)",
            task.process_id, report.jobs, report.iterations
        ),
        Err(e) => metrics.borrow_mut().record_unhandled_error(e.to_string()),
    }

    Ok(metrics.into_inner())
}
