//! Mergeable run outcomes.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Description, TestResult, TestStatus};

/// Counters accumulated across merges.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Summary {
    /// Number of test case executions folded into this outcome.
    pub executed: u64,
    /// Sum of per-test execution time (not wall time of the run).
    #[serde(rename = "test_time_ms", with = "crate::result::millis")]
    pub test_time: Duration,
}

/// Aggregate result of a run, or a fragment of one.
///
/// Every field merges by union or addition, so folding fragments in any
/// order produces the same outcome.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Outcome {
    /// Results keyed by `recipe.test`.
    pub results: BTreeMap<String, TestResult>,
    /// Modules that no recipe exercises.
    pub uncovered_modules: BTreeSet<String>,
    /// Expectation files on disk that no test case claims.
    pub unused_expectation_files: BTreeSet<PathBuf>,
    pub summary: Summary,
}

impl Outcome {
    pub fn new() -> Self {
        Outcome::default()
    }

    /// A fragment holding the result of a single test case execution.
    pub fn single(desc: &Description, result: TestResult) -> Self {
        let mut outcome = Outcome::default();
        outcome.summary.executed = 1;
        outcome.summary.test_time = result.duration;
        outcome.results.insert(desc.full_name(), result);
        outcome
    }

    /// Fold `other` into `self`.
    ///
    /// Sets and maps are unioned and counters added. If both sides carry a
    /// result for the same test, the greater one under `TestResult`'s total
    /// order wins (most severe status first), which keeps the merge
    /// commutative.
    pub fn merge(&mut self, other: Outcome) {
        for (name, result) in other.results {
            match self.results.entry(name) {
                Entry::Vacant(slot) => {
                    slot.insert(result);
                }
                Entry::Occupied(mut slot) => {
                    if result > *slot.get() {
                        slot.insert(result);
                    }
                }
            }
        }
        self.uncovered_modules.extend(other.uncovered_modules);
        self.unused_expectation_files
            .extend(other.unused_expectation_files);
        self.summary.executed += other.summary.executed;
        self.summary.test_time += other.summary.test_time;
    }

    /// Number of results with the given status.
    pub fn count(&self, status: TestStatus) -> usize {
        self.results.values().filter(|r| r.status == status).count()
    }

    pub fn passed(&self) -> usize {
        self.count(TestStatus::Passed)
    }

    pub fn failed(&self) -> usize {
        self.count(TestStatus::Failed)
    }

    pub fn crashed(&self) -> usize {
        self.count(TestStatus::Crashed)
    }

    /// Iterate over results that did not pass.
    pub fn problems(&self) -> impl Iterator<Item = (&str, &TestResult)> + '_ {
        self.results
            .iter()
            .filter(|(_, r)| !r.status.is_passed())
            .map(|(name, r)| (name.as_str(), r))
    }

    /// Returns true if anything in this outcome should fail the run.
    pub fn has_failures(&self) -> bool {
        self.problems().next().is_some()
            || !self.uncovered_modules.is_empty()
            || !self.unused_expectation_files.is_empty()
    }
}
