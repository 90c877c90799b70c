//! PostgreSQL client adapter for tpcb-bench.
//!
//! Provides a [`PgSessionPool`] implementing the engine's
//! [`SessionPool`](bench_core::SessionPool) contract, plus the schema and
//! initial-data routines used by `init`.

pub mod error;
pub mod initializer;
pub mod pool;
pub mod script;

pub use error::PostgreSQLError;
pub use initializer::{create_tables, BranchFiller};
pub use pool::{build_config, PgSession, PgSessionPool, PoolOptions};
