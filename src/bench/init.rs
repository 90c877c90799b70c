//! The `init` subcommand: create the tables and fill the branches.

use std::time::{Duration, Instant};

use anyhow::Context;
use bench_core::{split, ConnectionConfig, ExecutionMode, FailurePolicy, WorkerCoordinator};
use bench_postgresql::{create_tables, BranchFiller};
use tracing::info;

use super::open_pool;

/// Create the benchmark tables and fill `scale` branches using `jobs` jobs.
pub async fn run_init(
    connection: &ConnectionConfig,
    scale: i64,
    jobs: usize,
    settle_delay: Duration,
) -> anyhow::Result<()> {
    if scale < 1 {
        anyhow::bail!("--scale must be at least 1, got {scale}");
    }
    info!(
        "Initializing database with prefix_path={}, scale={}",
        connection.table_folder, scale
    );

    let pool = open_pool(connection).await?;
    if !settle_delay.is_zero() {
        tokio::time::sleep(settle_delay).await;
    }
    info!("Starting operations");

    let started = Instant::now();
    create_tables(&pool, &connection.table_folder)
        .await
        .context("Failed to create tables")?;

    let fillers: Vec<BranchFiller> = split(1, scale, jobs)?
        .into_iter()
        .map(|range| BranchFiller::new(range, &connection.table_folder))
        .collect();

    // Overlapping single-branch ranges (jobs > scale) refill the same rows idempotently
    let coordinator = WorkerCoordinator::new(ExecutionMode::Pooled, FailurePolicy::Wait);
    let report = coordinator
        .run(&pool, fillers)
        .await
        .context("Failed to fill tables")?;

    info!(
        "Initialization completed: {} branches filled by {} jobs in {:.1}s",
        scale,
        report.jobs,
        started.elapsed().as_secs_f64()
    );
    Ok(())
}
