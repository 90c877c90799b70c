//! Worker process entry point.
//!
//! A worker reads one [`WorkerTask`] as JSON from stdin, runs it against its
//! own session pool and writes a [`WorkerReport`] as JSON to stdout. Logs go
//! to stderr so stdout stays machine-readable.

use std::io::{Read, Write};

use anyhow::Context;
use bench_core::{run_worker, WorkerReport, WorkerTask};
use tracing::error;

use super::open_pool;

/// Run a task in the current process with a freshly opened pool.
///
/// A pool that cannot be opened is reported as an unhandled process error.
pub async fn run_in_process(task: &WorkerTask) -> WorkerReport {
    match open_pool(&task.connection).await {
        Ok(pool) => {
            let report = run_worker(&pool, task).await;
            pool.close();
            report
        }
        Err(e) => {
            error!("Process {}: {:#}", task.process_id, e);
            WorkerReport::failed(task.process_id, format!("process {}: {e:#}", task.process_id))
        }
    }
}

/// Entry point of the hidden `worker` subcommand.
pub async fn worker_main() -> anyhow::Result<()> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read worker task from stdin")?;
    let task: WorkerTask =
        serde_json::from_str(&input).context("Failed to parse worker task")?;

    let report = run_in_process(&task).await;

    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer(&mut stdout, &report).context("Failed to write worker report")?;
    stdout.flush().context("Failed to flush worker report")?;
    Ok(())
}
