//! Checks run before any load is generated.

use tracing::info;

use crate::error::{BenchError, Result};
use crate::session::SessionPool;
use crate::workload::TABLE_FOLDER_PLACEHOLDER;

const COUNT_BRANCHES: &str = "SELECT COUNT(*) FROM \"{table_folder}/branches\"";

/// Verify that at least `required` branches have been initialized.
pub async fn validate_scale<P: SessionPool>(
    pool: &P,
    table_folder: &str,
    required: i64,
) -> Result<()> {
    let sql = COUNT_BRANCHES.replace(TABLE_FOLDER_PLACEHOLDER, table_folder);
    let available = pool.query_count_with_retries(&sql).await?;
    if required > available {
        return Err(BenchError::RangeExceeded {
            required,
            available,
        });
    }
    info!(
        "Scale validation passed: {} branches available, {} required",
        available, required
    );
    Ok(())
}
