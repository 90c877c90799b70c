//! tpcb-bench library
//!
//! A parallel TPC-B-like (debit-credit) workload generator for PostgreSQL.
//!
//! # Features
//!
//! - Branch key space partitioned across OS processes and async jobs
//! - Weighted mix of built-in and user-provided SQL scripts
//! - Pooled (with retries) or single-session execution
//! - Preheat transactions excluded from statistics
//! - Latency and server-side duration percentiles merged across processes
//!
//! # CLI Usage
//!
//! ```bash
//! # Create and fill 100 branches
//! tpcb-bench --endpoint localhost:5432 --database bench --user postgres init --scale 100
//!
//! # 4 processes x 8 jobs, 70/30 mix of the built-in and a custom script
//! tpcb-bench --endpoint localhost:5432 --database bench --user postgres \
//!   run --scale 100 --processes 4 --jobs 8 --transactions 1000 \
//!   --builtin tpcb-like@70 --file custom.sql@30
//! ```

use std::path::PathBuf;

use anyhow::Context;
use bench_core::{ConnectionConfig, FailurePolicy, DEFAULT_TABLE_FOLDER};
use clap::{Parser, ValueEnum};

pub mod bench;
pub mod config;
pub mod testing;

/// Database connection options shared by every subcommand.
#[derive(Parser, Clone, Debug)]
pub struct ConnectionOpts {
    /// PostgreSQL endpoint: host[:port] or a postgresql:// URL
    #[arg(long, short = 'e', env = "BENCH_ENDPOINT", global = true)]
    pub endpoint: Option<String>,

    /// Database to work with
    #[arg(long, short = 'd', env = "BENCH_DATABASE", global = true)]
    pub database: Option<String>,

    /// Root CA certificate (PEM) enabling TLS
    #[arg(long, env = "BENCH_CA_FILE", value_name = "PATH", global = true)]
    pub ca_file: Option<PathBuf>,

    /// Username for authentication
    #[arg(long, env = "BENCH_USER", global = true)]
    pub user: Option<String>,

    /// Password for authentication
    #[arg(long, env = "BENCH_PASSWORD", hide_env_values = true, global = true)]
    pub password: Option<String>,

    /// Folder under which the benchmark tables are created
    #[arg(
        long,
        short = 'p',
        env = "BENCH_PREFIX_PATH",
        default_value = DEFAULT_TABLE_FOLDER,
        global = true
    )]
    pub prefix_path: String,
}

impl ConnectionOpts {
    /// Build a validated connection configuration.
    pub fn to_config(&self, pool_size: usize) -> anyhow::Result<ConnectionConfig> {
        let config = ConnectionConfig {
            endpoint: self
                .endpoint
                .clone()
                .context("--endpoint (or BENCH_ENDPOINT) is required")?,
            database: self
                .database
                .clone()
                .context("--database (or BENCH_DATABASE) is required")?,
            ca_file: self.ca_file.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            table_folder: self.prefix_path.clone(),
            pool_size,
        };
        config.validate().context("Invalid connection options")?;
        Ok(config)
    }
}

/// What to do with the remaining jobs when one job fails.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OnJobFailure {
    /// Let the other jobs run to completion
    #[default]
    Wait,
    /// Stop the other jobs before their next transaction
    StopSiblings,
}

impl From<OnJobFailure> for FailurePolicy {
    fn from(value: OnJobFailure) -> Self {
        match value {
            OnJobFailure::Wait => FailurePolicy::Wait,
            OnJobFailure::StopSiblings => FailurePolicy::StopSiblings,
        }
    }
}

/// Options of the `init` subcommand.
#[derive(Parser, Clone, Debug)]
pub struct InitArgs {
    /// Number of branches to create
    #[arg(long, short = 's', default_value_t = 100)]
    pub scale: i64,

    /// Number of parallel jobs filling the tables
    #[arg(long, short = 'j', default_value_t = 10)]
    pub jobs: usize,

    /// Maximum number of open sessions
    #[arg(long, default_value_t = 100)]
    pub pool_size: usize,

    /// Pause after connecting, before the first statement (e.g. "3s", "500ms")
    #[arg(long, default_value = "3s")]
    pub settle_delay: String,
}

/// Options of the `run` subcommand.
#[derive(Parser, Clone, Debug)]
pub struct RunArgs {
    /// Number of branches the workload spans (must not exceed the initialized ones)
    #[arg(long, short = 's', default_value_t = 100)]
    pub scale: i64,

    /// Number of parallel client processes
    #[arg(long, default_value_t = 1)]
    pub processes: usize,

    /// Number of async jobs per process
    #[arg(long, short = 'j', default_value_t = 1)]
    pub jobs: usize,

    /// Number of transactions each job runs
    #[arg(long, short = 't', default_value_t = 100)]
    pub transactions: u64,

    /// Number of leading transactions per job excluded from the metrics
    #[arg(long, default_value_t = 0)]
    pub preheat: u64,

    /// Hold one session per job instead of borrowing one per transaction
    #[arg(long)]
    pub single_session: bool,

    /// SQL file with optional weight: file.sql@weight (repeatable)
    #[arg(long, short = 'f', value_name = "FILE[@WEIGHT]")]
    pub file: Vec<String>,

    /// Built-in script with optional weight: NAME@weight (repeatable)
    #[arg(long, short = 'b', value_name = "NAME[@WEIGHT]")]
    pub builtin: Vec<String>,

    /// Behavior of the remaining jobs when one job fails
    #[arg(long, value_enum, default_value_t = OnJobFailure::Wait)]
    pub on_job_failure: OnJobFailure,

    /// Maximum number of open sessions per process
    #[arg(long, default_value_t = 100)]
    pub pool_size: usize,

    /// Pause after connecting, before the first transaction (e.g. "3s", "500ms")
    #[arg(long, default_value = "3s")]
    pub settle_delay: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        connection: ConnectionOpts,
        #[command(flatten)]
        run: RunArgs,
    }

    #[test]
    fn test_run_defaults() {
        let cli = TestCli::parse_from(["tpcb-bench", "--endpoint", "db:5432", "--database", "b"]);
        assert_eq!(cli.run.scale, 100);
        assert_eq!(cli.run.processes, 1);
        assert_eq!(cli.run.jobs, 1);
        assert_eq!(cli.run.transactions, 100);
        assert_eq!(cli.run.preheat, 0);
        assert!(!cli.run.single_session);
        assert!(cli.run.builtin.is_empty());
        assert_eq!(cli.run.on_job_failure, OnJobFailure::Wait);
        assert_eq!(cli.connection.prefix_path, "pgbench");
    }

    #[test]
    fn test_repeatable_scripts_and_policy() {
        let cli = TestCli::parse_from([
            "tpcb-bench",
            "-e",
            "db",
            "-d",
            "b",
            "-b",
            "tpcb-like@3",
            "-f",
            "a.sql@1",
            "-f",
            "b.sql",
            "--on-job-failure",
            "stop-siblings",
        ]);
        assert_eq!(cli.run.builtin, vec!["tpcb-like@3"]);
        assert_eq!(cli.run.file, vec!["a.sql@1", "b.sql"]);
        assert_eq!(
            FailurePolicy::from(cli.run.on_job_failure),
            FailurePolicy::StopSiblings
        );
    }

    #[test]
    fn test_connection_config_validation() {
        let mut cli = TestCli::parse_from(["tpcb-bench", "-e", "db", "-d", "b"]);
        let config = cli.connection.to_config(8).unwrap();
        assert_eq!(config.endpoint, "db");
        assert_eq!(config.pool_size, 8);

        cli.connection.prefix_path = "bad prefix".to_string();
        assert!(cli.connection.to_config(8).is_err());

        cli.connection.prefix_path = "pgbench".to_string();
        cli.connection.endpoint = None;
        assert!(cli.connection.to_config(8).is_err());
    }
}
