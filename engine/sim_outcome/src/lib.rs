//! Data model shared by every stage of a simulation test run.
//!
//! - [`Description`]: names one test case (recipe + test).
//! - [`TestResult`] / [`TestStatus`]: the result of executing one test case.
//! - [`Outcome`]: a mergeable aggregate of results. Workers produce one
//!   fragment per test case; the aggregator folds them into the master
//!   outcome in whatever order they arrive, so [`Outcome::merge`] is
//!   commutative and associative.
//! - [`CoverageData`]: per-worker line coverage, merged once per run.

mod coverage;
mod description;
mod outcome;
mod result;

pub use coverage::{CoverageData, CoverageError, FileCoverage};
pub use description::Description;
pub use outcome::{Outcome, Summary};
pub use result::{TestResult, TestStatus};
