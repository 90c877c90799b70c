//! Schema creation and initial data for the four benchmark tables.

use async_trait::async_trait;
use bench_core::params::{ACCOUNTS_PER_BRANCH, TELLERS_PER_BRANCH};
use bench_core::workload::TABLE_FOLDER_PLACEHOLDER;
use bench_core::{BidRange, JobOperation, Param, Parameters, Session, SessionError, SessionPool};
use tracing::info;

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS "{table_folder}/branches" (
    bid BIGINT NOT NULL PRIMARY KEY,
    bbalance BIGINT NOT NULL DEFAULT 0,
    filler CHAR(88)
);
CREATE TABLE IF NOT EXISTS "{table_folder}/tellers" (
    tid BIGINT NOT NULL PRIMARY KEY,
    bid BIGINT NOT NULL,
    tbalance BIGINT NOT NULL DEFAULT 0,
    filler CHAR(84)
);
CREATE TABLE IF NOT EXISTS "{table_folder}/accounts" (
    aid BIGINT NOT NULL PRIMARY KEY,
    bid BIGINT NOT NULL,
    abalance BIGINT NOT NULL DEFAULT 0,
    filler CHAR(84)
);
CREATE TABLE IF NOT EXISTS "{table_folder}/history" (
    tid BIGINT,
    bid BIGINT,
    aid BIGINT NOT NULL,
    delta BIGINT,
    mtime TIMESTAMPTZ NOT NULL,
    filler CHAR(22),
    PRIMARY KEY (aid, mtime)
);
"#;

/// Render the DDL for the given table folder.
pub fn create_tables_sql(table_folder: &str) -> String {
    CREATE_TABLES.replace(TABLE_FOLDER_PLACEHOLDER, table_folder)
}

/// Render the script that (re)fills one branch, its tellers and its accounts.
pub fn fill_branch_script(table_folder: &str) -> String {
    format!(
        r#"
INSERT INTO "{table_folder}/branches" (bid, bbalance)
VALUES ($bid, 0)
ON CONFLICT (bid) DO UPDATE SET bbalance = 0;
INSERT INTO "{table_folder}/tellers" (tid, bid, tbalance)
SELECT ($bid - 1) * {TELLERS_PER_BRANCH} + s, $bid, 0
FROM generate_series(1, {TELLERS_PER_BRANCH}) AS s
ON CONFLICT (tid) DO UPDATE SET bid = EXCLUDED.bid, tbalance = 0;
INSERT INTO "{table_folder}/accounts" (aid, bid, abalance)
SELECT ($bid - 1) * {ACCOUNTS_PER_BRANCH} + s, $bid, 0
FROM generate_series(1, {ACCOUNTS_PER_BRANCH}) AS s
ON CONFLICT (aid) DO UPDATE SET bid = EXCLUDED.bid, abalance = 0;
"#
    )
}

/// Create all benchmark tables if they do not exist.
pub async fn create_tables<P: SessionPool>(pool: &P, table_folder: &str) -> Result<(), SessionError> {
    info!("Creating tables under '{}'", table_folder);
    pool.execute_with_retries(&create_tables_sql(table_folder))
        .await?;
    info!("Tables created");
    Ok(())
}

/// Fills every branch of its range, one branch per iteration.
pub struct BranchFiller {
    range: BidRange,
    script: String,
}

impl BranchFiller {
    pub fn new(range: BidRange, table_folder: &str) -> Self {
        Self {
            range,
            script: fill_branch_script(table_folder),
        }
    }
}

#[async_trait(?Send)]
impl JobOperation for BranchFiller {
    fn label(&self) -> &str {
        "Initializer"
    }

    fn range(&self) -> BidRange {
        self.range
    }

    fn iterations(&self) -> u64 {
        self.range.len() as u64
    }

    async fn execute<S: Session>(&self, session: &mut S, iteration: u64) -> Result<(), SessionError> {
        let bid = self.range.from + iteration as i64;
        let params = Parameters::single(Param::Bid, bid);
        session.execute_in_transaction(&self.script, &params).await?;
        Ok(())
    }
}
