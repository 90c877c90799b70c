//! Per-transaction metrics collection, merging and summarization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::QueryStats;

/// Outcome and timing of a single transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_message: String,
    /// Server-reported duration in microseconds; 0 when not reported.
    #[serde(default)]
    pub server_duration_us: i64,
    /// Server-reported CPU time in microseconds; 0 when not reported.
    #[serde(default)]
    pub server_cpu_us: i64,
}

impl TransactionRecord {
    /// Record for a committed transaction.
    pub fn succeeded(
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        stats: QueryStats,
    ) -> Self {
        Self {
            started_at,
            finished_at,
            success: true,
            error_message: String::new(),
            server_duration_us: stats.total_duration_us,
            server_cpu_us: stats.total_cpu_us,
        }
    }

    /// Record for a transaction that raised an error.
    pub fn failed(
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            started_at,
            finished_at,
            success: false,
            error_message: error_message.into(),
            server_duration_us: 0,
            server_cpu_us: 0,
        }
    }

    /// Client-observed latency in milliseconds.
    pub fn latency_ms(&self) -> f64 {
        let delta = self.finished_at - self.started_at;
        match delta.num_microseconds() {
            Some(us) => us as f64 / 1000.0,
            None => delta.num_milliseconds() as f64,
        }
    }

    /// Server duration in milliseconds, if this record contributes one.
    pub fn server_duration_ms(&self) -> Option<f64> {
        (self.success && self.server_duration_us > 0)
            .then(|| self.server_duration_us as f64 / 1000.0)
    }

    /// Server CPU time in milliseconds, if this record contributes one.
    pub fn server_cpu_ms(&self) -> Option<f64> {
        (self.success && self.server_cpu_us > 0).then(|| self.server_cpu_us as f64 / 1000.0)
    }
}

/// Accumulates transaction records for one process-level run.
///
/// Collectors from independent processes are combined with [`merge`](Self::merge),
/// which is commutative and associative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsCollector {
    records: Vec<TransactionRecord>,
    started_at: DateTime<Utc>,
    #[serde(default)]
    unhandled_errors: Vec<String>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    /// Create an empty collector whose run starts now.
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(started_at: DateTime<Utc>) -> Self {
        Self {
            records: Vec::new(),
            started_at,
            unhandled_errors: Vec::new(),
        }
    }

    pub fn record(&mut self, record: TransactionRecord) {
        self.records.push(record);
    }

    /// Attach an error that escaped every job of the process.
    pub fn record_unhandled_error(&mut self, message: impl Into<String>) {
        self.unhandled_errors.push(message.into());
    }

    /// Append all of `other`'s records and keep the earliest start time.
    ///
    /// A collector without records observed no start, so its start time only
    /// counts when neither side has records.
    pub fn merge(&mut self, other: MetricsCollector) {
        self.started_at = match (self.records.is_empty(), other.records.is_empty()) {
            (false, true) => self.started_at,
            (true, false) => other.started_at,
            _ => self.started_at.min(other.started_at),
        };
        self.records.extend(other.records);
        self.unhandled_errors.extend(other.unhandled_errors);
    }

    /// Merge any number of collectors. Returns `None` for an empty input.
    pub fn merge_all(collectors: impl IntoIterator<Item = MetricsCollector>) -> Option<Self> {
        collectors.into_iter().reduce(|mut acc, next| {
            acc.merge(next);
            acc
        })
    }

    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    pub fn unhandled_errors(&self) -> &[String] {
        &self.unhandled_errors
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Summarize all records as of now.
    pub fn summary(&self) -> Summary {
        self.summary_at(Utc::now())
    }

    /// Summarize all records, measuring throughput up to `now`.
    pub fn summary_at(&self, now: DateTime<Utc>) -> Summary {
        let total = self.records.len();
        let successful = self.records.iter().filter(|r| r.success).count();

        let total_duration_secs = if total == 0 {
            0.0
        } else {
            (now - self.started_at)
                .num_microseconds()
                .map(|us| us as f64 / 1_000_000.0)
                .unwrap_or(0.0)
                .max(0.0)
        };
        let tps = if total_duration_secs > 0.0 {
            total as f64 / total_duration_secs
        } else {
            0.0
        };

        let latency = Distribution::from_values(self.records.iter().map(|r| r.latency_ms()));
        let server_duration =
            Distribution::from_values(self.records.iter().filter_map(|r| r.server_duration_ms()));
        let server_cpu =
            Distribution::from_values(self.records.iter().filter_map(|r| r.server_cpu_ms()));

        // Sorted so the summary does not depend on merge order
        let mut unhandled_errors = self.unhandled_errors.clone();
        unhandled_errors.sort();

        Summary {
            total_duration_secs,
            total_transactions: total,
            successful_transactions: successful,
            failed_transactions: total - successful,
            tps,
            latency,
            server_duration,
            server_cpu,
            unhandled_errors,
        }
    }
}

/// Statistics of one metric, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub count: usize,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

impl Distribution {
    /// Compute average, extremes and nearest-rank percentiles.
    ///
    /// An empty input yields all zeros.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        let mut sorted: Vec<f64> = values.into_iter().collect();
        if sorted.is_empty() {
            return Self::default();
        }
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let avg = sorted.iter().sum::<f64>() / count as f64;

        Self {
            count,
            avg,
            min: sorted[0],
            max: sorted[count - 1],
            p50: percentile(&sorted, 0.50),
            p95: percentile(&sorted, 0.95),
            p99: percentile(&sorted, 0.99),
        }
    }
}

/// Nearest-rank percentile: `sorted[floor(len * p)]`, clamped to the last index.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = ((sorted.len() as f64 * p) as usize).min(sorted.len() - 1);
    sorted[index]
}

/// Summary statistics of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_duration_secs: f64,
    pub total_transactions: usize,
    pub successful_transactions: usize,
    pub failed_transactions: usize,
    pub tps: f64,
    pub latency: Distribution,
    pub server_duration: Distribution,
    pub server_cpu: Distribution,
    pub unhandled_errors: Vec<String>,
}
