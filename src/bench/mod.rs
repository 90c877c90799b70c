//! Benchmark orchestration: `init`, `run` and the worker process entry.

pub mod init;
pub mod parallel;
pub mod run;
pub mod worker;

use anyhow::Context;
use bench_core::{ConnectionConfig, RetryPolicy};
use bench_postgresql::{PgSessionPool, PoolOptions};

pub use init::run_init;
pub use run::{build_script_sources, run_benchmark};
pub use worker::{run_in_process, worker_main};

/// Open a session pool sized by `config.pool_size`.
pub async fn open_pool(config: &ConnectionConfig) -> anyhow::Result<PgSessionPool> {
    let options = PoolOptions {
        max_sessions: config.pool_size,
        retry: RetryPolicy::default(),
        ..Default::default()
    };
    PgSessionPool::connect(config, options)
        .await
        .with_context(|| format!("Failed to connect to PostgreSQL at {}", config.endpoint))
}
