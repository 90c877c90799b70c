//! TPC-B transaction executor.

use std::cell::{Cell, RefCell};

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use tracing::trace;

use crate::error::SessionError;
use crate::job::JobOperation;
use crate::metrics::{MetricsCollector, TransactionRecord};
use crate::params::{KeyValues, Parameters, ACCOUNTS_PER_BRANCH, TELLERS_PER_BRANCH};
use crate::partitioner::BidRange;
use crate::session::Session;
use crate::workload::ScriptCatalog;

/// Upper bound of the random balance delta.
pub const MAX_DELTA: i64 = 1000;

/// Generate random keys restricted to `range`.
///
/// The teller and account are always drawn from the chosen branch.
pub fn generate_keys<R: Rng + ?Sized>(rng: &mut R, range: BidRange, iteration: u64) -> KeyValues {
    let bid = rng.random_range(range.from..=range.to);
    let tid = (bid - 1) * TELLERS_PER_BRANCH + rng.random_range(1..=TELLERS_PER_BRANCH);
    let aid = (bid - 1) * ACCOUNTS_PER_BRANCH + rng.random_range(1..=ACCOUNTS_PER_BRANCH);
    let delta = rng.random_range(1..=MAX_DELTA);
    KeyValues {
        bid,
        tid,
        aid,
        delta,
        iteration: iteration as i64,
    }
}

/// Runs randomized workload transactions and records their metrics.
///
/// The first `preheat` iterations execute normally but are not recorded.
pub struct TransactionExecutor<'a> {
    range: BidRange,
    transactions: u64,
    preheat: u64,
    catalog: &'a ScriptCatalog,
    metrics: &'a RefCell<MetricsCollector>,
    invocations: Cell<u64>,
}

impl<'a> TransactionExecutor<'a> {
    pub fn new(
        range: BidRange,
        transactions: u64,
        catalog: &'a ScriptCatalog,
        metrics: &'a RefCell<MetricsCollector>,
    ) -> Self {
        Self {
            range,
            transactions,
            preheat: 0,
            catalog,
            metrics,
            invocations: Cell::new(0),
        }
    }

    pub fn with_preheat(mut self, preheat: u64) -> Self {
        self.preheat = preheat;
        self
    }

    pub fn preheat(&self) -> u64 {
        self.preheat
    }

    /// Number of transactions attempted so far, retries and preheat included.
    pub fn invocations(&self) -> u64 {
        self.invocations.get()
    }
}

#[async_trait(?Send)]
impl<'a> JobOperation for TransactionExecutor<'a> {
    fn label(&self) -> &str {
        "Job"
    }

    fn range(&self) -> BidRange {
        self.range
    }

    fn iterations(&self) -> u64 {
        self.transactions
    }

    async fn execute<S: Session>(
        &self,
        session: &mut S,
        iteration: u64,
    ) -> Result<(), SessionError> {
        self.invocations.set(self.invocations.get() + 1);

        let started_at = Utc::now();
        let (script, params) = {
            let mut rng = rand::rng();
            let keys = generate_keys(&mut rng, self.range, iteration);
            let script = self.catalog.select(&mut rng);
            (script, Parameters::for_script(script.used_params(), &keys))
        };

        let result = session
            .execute_in_transaction(script.content(), &params)
            .await;
        let finished_at = Utc::now();

        if iteration < self.preheat {
            trace!("Preheat iteration {} not recorded", iteration);
            return result.map(|_| ());
        }

        let record = match &result {
            Ok(stats) => TransactionRecord::succeeded(started_at, finished_at, *stats),
            Err(e) => TransactionRecord::failed(started_at, finished_at, e.to_string()),
        };
        self.metrics.borrow_mut().record(record);

        result.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_keys_stay_within_branch() {
        let mut rng = StdRng::seed_from_u64(7);
        let range = BidRange::new(5, 8).unwrap();
        for i in 0..10_000 {
            let keys = generate_keys(&mut rng, range, i);
            assert!(range.contains(keys.bid));
            assert!(keys.tid > (keys.bid - 1) * TELLERS_PER_BRANCH);
            assert!(keys.tid <= keys.bid * TELLERS_PER_BRANCH);
            assert!(keys.aid > (keys.bid - 1) * ACCOUNTS_PER_BRANCH);
            assert!(keys.aid <= keys.bid * ACCOUNTS_PER_BRANCH);
            assert!((1..=MAX_DELTA).contains(&keys.delta));
            assert_eq!(keys.iteration, i as i64);
        }
    }

    #[test]
    fn test_single_branch_range() {
        let mut rng = StdRng::seed_from_u64(1);
        let range = BidRange::new(42, 42).unwrap();
        for i in 0..100 {
            assert_eq!(generate_keys(&mut rng, range, i).bid, 42);
        }
    }
}
