//! Bound parameters of a workload script.

use serde::{Deserialize, Serialize};

/// Number of tellers per branch. Must match the initialized dataset.
pub const TELLERS_PER_BRANCH: i64 = 10;

/// Number of accounts per branch. Must match the initialized dataset.
pub const ACCOUNTS_PER_BRANCH: i64 = 100_000;

/// A named parameter a script may reference as `$name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Param {
    Bid,
    Tid,
    Aid,
    Delta,
    Iteration,
}

impl Param {
    pub const ALL: [Param; 5] = [
        Param::Bid,
        Param::Tid,
        Param::Aid,
        Param::Delta,
        Param::Iteration,
    ];

    /// Parameter name without the `$` sigil.
    pub fn name(&self) -> &'static str {
        match self {
            Param::Bid => "bid",
            Param::Tid => "tid",
            Param::Aid => "aid",
            Param::Delta => "delta",
            Param::Iteration => "iteration",
        }
    }

    /// Placeholder as written in script text.
    pub fn placeholder(&self) -> &'static str {
        match self {
            Param::Bid => "$bid",
            Param::Tid => "$tid",
            Param::Aid => "$aid",
            Param::Delta => "$delta",
            Param::Iteration => "$iteration",
        }
    }

    pub fn from_name(name: &str) -> Option<Param> {
        Param::ALL.into_iter().find(|p| p.name() == name)
    }
}

/// The set of parameters a script references, computed once at load time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsedParams {
    pub bid: bool,
    pub tid: bool,
    pub aid: bool,
    pub delta: bool,
    pub iteration: bool,
}

impl UsedParams {
    /// Detect parameter usage by searching the script text for each placeholder.
    pub fn detect(content: &str) -> Self {
        Self {
            bid: content.contains(Param::Bid.placeholder()),
            tid: content.contains(Param::Tid.placeholder()),
            aid: content.contains(Param::Aid.placeholder()),
            delta: content.contains(Param::Delta.placeholder()),
            iteration: content.contains(Param::Iteration.placeholder()),
        }
    }

    pub fn contains(&self, param: Param) -> bool {
        match param {
            Param::Bid => self.bid,
            Param::Tid => self.tid,
            Param::Aid => self.aid,
            Param::Delta => self.delta,
            Param::Iteration => self.iteration,
        }
    }

    pub fn count(&self) -> usize {
        Param::ALL.iter().filter(|p| self.contains(**p)).count()
    }
}

/// Randomized key values generated for one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyValues {
    pub bid: i64,
    pub tid: i64,
    pub aid: i64,
    pub delta: i64,
    pub iteration: i64,
}

impl KeyValues {
    fn value(&self, param: Param) -> i64 {
        match param {
            Param::Bid => self.bid,
            Param::Tid => self.tid,
            Param::Aid => self.aid,
            Param::Delta => self.delta,
            Param::Iteration => self.iteration,
        }
    }
}

/// Named parameter values bound to one script execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters {
    values: Vec<(Param, i64)>,
}

impl Parameters {
    /// Bind exactly the parameters `used` marks as referenced.
    pub fn for_script(used: UsedParams, keys: &KeyValues) -> Self {
        let values = Param::ALL
            .into_iter()
            .filter(|p| used.contains(*p))
            .map(|p| (p, keys.value(p)))
            .collect();
        Self { values }
    }

    /// Bind a single parameter.
    pub fn single(param: Param, value: i64) -> Self {
        Self {
            values: vec![(param, value)],
        }
    }

    /// Look up a value by parameter name (without `$`).
    pub fn get(&self, name: &str) -> Option<i64> {
        self.values
            .iter()
            .find(|(p, _)| p.name() == name)
            .map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Param, i64)> + '_ {
        self.values.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
