//! OS-process fan-out.
//!
//! Each worker runs in a child copy of the current executable so it gets its
//! own runtime, pool and memory. A child that crashes or returns garbage is
//! turned into an empty report carrying the failure as an unhandled error.

use std::process::Stdio;

use anyhow::Context;
use bench_core::{WorkerReport, WorkerTask};
use futures::future::join_all;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{error, info};

/// Name of the hidden subcommand a child process is started with.
pub const WORKER_SUBCOMMAND: &str = "worker";

/// Run every task in its own child process and collect the reports.
pub async fn run_processes(tasks: Vec<WorkerTask>) -> Vec<WorkerReport> {
    info!("Starting {} worker processes", tasks.len());
    join_all(tasks.into_iter().map(|task| async move {
        let process_id = task.process_id;
        match spawn_worker(&task).await {
            Ok(report) => report,
            Err(e) => {
                error!("Process {} failed: {:#}", process_id, e);
                WorkerReport::failed(process_id, format!("process {process_id}: {e:#}"))
            }
        }
    }))
    .await
}

async fn spawn_worker(task: &WorkerTask) -> anyhow::Result<WorkerReport> {
    let exe = std::env::current_exe().context("Failed to locate the current executable")?;
    let payload = serde_json::to_vec(task).context("Failed to serialize worker task")?;

    let mut child = Command::new(exe)
        .arg(WORKER_SUBCOMMAND)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .context("Failed to spawn worker process")?;

    let mut stdin = child
        .stdin
        .take()
        .context("Worker process has no stdin")?;
    stdin
        .write_all(&payload)
        .await
        .context("Failed to send task to worker process")?;
    // Closing stdin signals the end of the task
    drop(stdin);

    let output = child
        .wait_with_output()
        .await
        .context("Failed to wait for worker process")?;
    if !output.status.success() {
        anyhow::bail!("worker exited with {}", output.status);
    }

    parse_report(&output.stdout, task.process_id)
}

/// Parse a child's stdout into a report.
pub fn parse_report(stdout: &[u8], process_id: usize) -> anyhow::Result<WorkerReport> {
    let report: WorkerReport =
        serde_json::from_slice(stdout).context("Worker returned an unreadable report")?;
    if report.process_id != process_id {
        anyhow::bail!(
            "worker returned a report for process {} instead of {}",
            report.process_id,
            process_id
        );
    }
    Ok(report)
}
