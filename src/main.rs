//! Command-line interface for tpcb-bench
//!
//! # Usage Examples
//!
//! ## Initialize
//! ```bash
//! tpcb-bench --endpoint localhost:5432 --database bench --user postgres \
//!   init --scale 100 --jobs 10
//! ```
//!
//! ## Run
//! ```bash
//! # Pooled mode, 4 processes x 8 jobs
//! tpcb-bench --endpoint localhost:5432 --database bench --user postgres \
//!   run --scale 100 --processes 4 --jobs 8 --transactions 1000 --preheat 50
//!
//! # Weighted mix, single session per job, stop everything on first failure
//! tpcb-bench -e localhost -d bench \
//!   run --builtin tpcb-like@70 --builtin select-only@30 --file custom.sql \
//!   --single-session --on-job-failure stop-siblings
//! ```
//!
//! Logs are written to stderr and filtered with `RUST_LOG` (default `info`).
//! The summary is the only output on stdout.

use anyhow::Context;
use bench_core::ExecutionMode;
use clap::{Parser, Subcommand};
use tpcb_bench::bench::run::RunPlan;
use tpcb_bench::bench::{build_script_sources, run_benchmark, run_init, worker_main};
use tpcb_bench::config::parse_duration;
use tpcb_bench::{ConnectionOpts, InitArgs, RunArgs};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tpcb-bench")]
#[command(about = "A parallel TPC-B-like workload generator for PostgreSQL")]
#[command(long_about = None)]
struct Cli {
    /// Database connection options
    #[command(flatten)]
    connection: ConnectionOpts,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the benchmark tables and fill them with initial data
    Init(InitArgs),

    /// Run the workload and print a metrics summary
    Run(RunArgs),

    /// Run one worker process (reads a task from stdin)
    #[command(hide = true)]
    Worker,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing; stdout is reserved for the summary and worker reports
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init(args) => {
            let connection = cli.connection.to_config(args.pool_size)?;
            let settle_delay = parse_duration(&args.settle_delay)
                .with_context(|| format!("Invalid --settle-delay '{}'", args.settle_delay))?;
            run_init(&connection, args.scale, args.jobs, settle_delay).await?;
        }
        Commands::Run(args) => {
            let connection = cli.connection.to_config(args.pool_size)?;
            let settle_delay = parse_duration(&args.settle_delay)
                .with_context(|| format!("Invalid --settle-delay '{}'", args.settle_delay))?;
            let scripts = build_script_sources(&args.file, &args.builtin)?;
            let mode = if args.single_session {
                ExecutionMode::SingleSession
            } else {
                ExecutionMode::Pooled
            };
            let plan = RunPlan {
                scale: args.scale,
                processes: args.processes,
                jobs: args.jobs,
                transactions: args.transactions,
                preheat: args.preheat,
                mode,
                failure_policy: args.on_job_failure.into(),
                settle_delay,
                scripts,
            };
            run_benchmark(&connection, plan).await?;
        }
        Commands::Worker => {
            worker_main().await?;
        }
    }

    Ok(())
}
