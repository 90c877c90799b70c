//! Workload engine for tpcb-bench.
//!
//! This crate knows nothing about a concrete database. It partitions the
//! branch key space, picks weighted scripts, drives jobs against an abstract
//! [`SessionPool`] and aggregates per-transaction metrics into a summary.
//! A client adapter (see `bench-postgresql`) supplies the pool.
//!
//! # Architecture
//!
//! ```text
//! WorkerTask ──► run_worker
//!                  ├─ ScriptCatalog (weighted selection)
//!                  ├─ validate_scale
//!                  └─ WorkerCoordinator ──► JobLoop × jobs
//!                                             └─ TransactionExecutor ──► Session
//!                                                        │
//!                                                        ▼
//!                                               MetricsCollector ──► WorkerReport
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod job;
pub mod metrics;
pub mod params;
pub mod partitioner;
pub mod report;
pub mod session;
pub mod validate;
pub mod worker;
pub mod workload;

pub use config::{validate_table_folder, ConnectionConfig, DEFAULT_TABLE_FOLDER};
pub use coordinator::{plan_jobs, CoordinatorReport, FailurePolicy, WorkerCoordinator};
pub use error::{BenchError, Result, SessionError};
pub use executor::{generate_keys, TransactionExecutor};
pub use job::{ExecutionMode, JobLoop, JobOperation, JobOutcome, JobState};
pub use metrics::{Distribution, MetricsCollector, Summary, TransactionRecord};
pub use params::{KeyValues, Param, Parameters, UsedParams};
pub use partitioner::{split, split_range, BidRange};
pub use report::format_summary;
pub use session::{QueryStats, RetryPolicy, Session, SessionPool};
pub use validate::validate_scale;
pub use worker::{run_worker, WorkerReport, WorkerTask};
pub use workload::{
    builtin_script, parse_weighted_spec, ScriptCatalog, ScriptSource, WorkloadScript,
    BUILTIN_NAMES, DEFAULT_BUILTIN,
};
