//! Connection configuration shared by the orchestrator and worker processes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};

/// Default table folder prefix.
pub const DEFAULT_TABLE_FOLDER: &str = "pgbench";

/// Everything a process needs to open its own session pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// `host[:port]` or a `postgresql://` connection URL.
    pub endpoint: String,
    pub database: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Prefix under which the benchmark tables live.
    pub table_folder: String,
    /// Maximum number of concurrently open sessions.
    pub pool_size: usize,
}

impl ConnectionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(BenchError::Config("endpoint must not be empty".to_string()));
        }
        if self.database.trim().is_empty() {
            return Err(BenchError::Config("database must not be empty".to_string()));
        }
        if self.password.is_some() && self.user.is_none() {
            return Err(BenchError::Config(
                "password given without a user".to_string(),
            ));
        }
        if self.pool_size == 0 {
            return Err(BenchError::Config(
                "pool size must be at least 1".to_string(),
            ));
        }
        validate_table_folder(&self.table_folder)
    }
}

/// Check a table folder against `^[A-Za-z0-9_\-/]+$`.
pub fn validate_table_folder(folder: &str) -> Result<()> {
    let valid = !folder.is_empty()
        && folder
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '/'));
    if valid {
        Ok(())
    } else {
        Err(BenchError::Config(format!(
            "Invalid prefix path '{folder}': only letters, digits, '_', '-' and '/' are allowed"
        )))
    }
}
