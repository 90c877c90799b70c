//! Workload scripts and weighted random selection.
//!
//! A run executes one or more SQL scripts, each carrying a positive weight.
//! For every transaction one script is drawn with probability
//! `weight / total_weight`.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};
use crate::params::UsedParams;

/// Placeholder replaced by the configured table folder.
pub const TABLE_FOLDER_PLACEHOLDER: &str = "{table_folder}";

/// Name of the built-in script used when no script is given.
pub const DEFAULT_BUILTIN: &str = "tpcb-like";

const TPCB_LIKE: &str = r#"
UPDATE "{table_folder}/accounts" SET abalance = abalance + $delta WHERE aid = $aid;
SELECT abalance FROM "{table_folder}/accounts" WHERE aid = $aid;
UPDATE "{table_folder}/tellers" SET tbalance = tbalance + $delta WHERE tid = $tid;
UPDATE "{table_folder}/branches" SET bbalance = bbalance + $delta WHERE bid = $bid;
INSERT INTO "{table_folder}/history" (tid, bid, aid, delta, mtime)
VALUES ($tid, $bid, $aid, $delta, clock_timestamp());
"#;

const SIMPLE_UPDATE: &str = r#"
UPDATE "{table_folder}/accounts" SET abalance = abalance + $delta WHERE aid = $aid;
SELECT abalance FROM "{table_folder}/accounts" WHERE aid = $aid;
INSERT INTO "{table_folder}/history" (tid, bid, aid, delta, mtime)
VALUES ($tid, $bid, $aid, $delta, clock_timestamp());
"#;

const SELECT_ONLY: &str = r#"
SELECT abalance FROM "{table_folder}/accounts" WHERE aid = $aid;
"#;

/// Names accepted by `--builtin`.
pub const BUILTIN_NAMES: [&str; 3] = ["tpcb-like", "simple-update", "select-only"];

/// Look up the text of a built-in script.
pub fn builtin_script(name: &str) -> Option<&'static str> {
    match name {
        "tpcb-like" => Some(TPCB_LIKE),
        "simple-update" => Some(SIMPLE_UPDATE),
        "select-only" => Some(SELECT_ONLY),
        _ => None,
    }
}

/// Parse a `NAME[@weight]` specification.
///
/// The weight defaults to 1.0 and must be a positive number.
pub fn parse_weighted_spec(value: &str) -> Result<(String, f64)> {
    let Some((name, weight_str)) = value.rsplit_once('@') else {
        return Ok((value.to_string(), 1.0));
    };

    let weight: f64 = weight_str.trim().parse().map_err(|_| {
        BenchError::InvalidArgument(format!(
            "Invalid weight syntax in: {value}. Expected format: NAME@weight"
        ))
    })?;
    if !weight.is_finite() || weight <= 0.0 {
        return Err(BenchError::InvalidArgument(format!(
            "Weight must be positive in: {value}"
        )));
    }
    if name.is_empty() {
        return Err(BenchError::InvalidArgument(format!(
            "Missing name in: {value}"
        )));
    }

    Ok((name.to_string(), weight))
}

/// Unresolved script text as shipped to worker processes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptSource {
    /// Where the script came from (`<builtin:tpcb-like>` or a file path).
    pub identity: String,
    /// Script text, possibly still containing `{table_folder}`.
    pub content: String,
    pub weight: f64,
}

impl ScriptSource {
    /// Source for a named built-in script.
    pub fn builtin(name: &str, weight: f64) -> Result<Self> {
        let content = builtin_script(name).ok_or_else(|| {
            BenchError::InvalidArgument(format!(
                "Unknown builtin name: {name}. Valid options: {}",
                BUILTIN_NAMES.join(", ")
            ))
        })?;
        Ok(Self {
            identity: format!("<builtin:{name}>"),
            content: content.to_string(),
            weight,
        })
    }

    /// Resolve the table folder and derive parameter usage.
    pub fn load(&self, table_folder: &str) -> Result<WorkloadScript> {
        WorkloadScript::new(&self.identity, &self.content, self.weight, table_folder)
    }
}

/// A resolved workload script with its cached parameter usage.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadScript {
    identity: String,
    content: String,
    weight: f64,
    used: UsedParams,
}

impl WorkloadScript {
    pub fn new(identity: &str, content: &str, weight: f64, table_folder: &str) -> Result<Self> {
        if !weight.is_finite() || weight <= 0.0 {
            return Err(BenchError::InvalidArgument(format!(
                "Weight must be positive, got {weight} for {identity}"
            )));
        }

        let content = content.replace(TABLE_FOLDER_PLACEHOLDER, table_folder);
        let used = UsedParams::detect(&content);

        Ok(Self {
            identity: identity.to_string(),
            content,
            weight,
            used,
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Script text with the table folder resolved.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn used_params(&self) -> UsedParams {
        self.used
    }
}

/// Immutable set of weighted scripts.
///
/// Cumulative weights are built together with the script list, so a catalog
/// is either complete or not constructed at all.
#[derive(Debug, Clone)]
pub struct ScriptCatalog {
    scripts: Vec<WorkloadScript>,
    cumulative: Vec<f64>,
    total_weight: f64,
}

impl ScriptCatalog {
    pub fn new(scripts: Vec<WorkloadScript>) -> Result<Self> {
        if scripts.is_empty() {
            return Err(BenchError::InvalidArgument(
                "At least one script must be provided".to_string(),
            ));
        }
        if let Some(bad) = scripts
            .iter()
            .find(|s| !s.weight.is_finite() || s.weight <= 0.0)
        {
            return Err(BenchError::InvalidArgument(format!(
                "Weight must be positive, got {} for {}",
                bad.weight, bad.identity
            )));
        }

        // weights [70, 20, 10] -> cumulative [70, 90, 100]
        let cumulative: Vec<f64> = scripts
            .iter()
            .scan(0.0, |acc, s| {
                *acc += s.weight;
                Some(*acc)
            })
            .collect();
        let total_weight = cumulative.last().copied().unwrap_or(0.0);

        if total_weight <= 0.0 || !total_weight.is_finite() {
            return Err(BenchError::InvalidArgument(
                "Total weight must be positive".to_string(),
            ));
        }

        Ok(Self {
            scripts,
            cumulative,
            total_weight,
        })
    }

    /// Load a catalog from serialized sources.
    pub fn from_sources(sources: &[ScriptSource], table_folder: &str) -> Result<Self> {
        let scripts = sources
            .iter()
            .map(|s| s.load(table_folder))
            .collect::<Result<Vec<_>>>()?;
        Self::new(scripts)
    }

    /// Draw one script at random, proportionally to its weight.
    pub fn select<R: Rng + ?Sized>(&self, rng: &mut R) -> &WorkloadScript {
        let draw = rng.random_range(0.0..self.total_weight);
        self.select_with_draw(draw)
    }

    /// Return the first script whose cumulative weight exceeds `draw`.
    ///
    /// Draws at or beyond the total weight fall back to the last script.
    pub fn select_with_draw(&self, draw: f64) -> &WorkloadScript {
        self.cumulative
            .iter()
            .position(|&c| draw < c)
            .map(|i| &self.scripts[i])
            .unwrap_or_else(|| &self.scripts[self.scripts.len() - 1])
    }

    pub fn scripts(&self) -> &[WorkloadScript] {
        &self.scripts
    }

    pub fn cumulative_weights(&self) -> &[f64] {
        &self.cumulative
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}
