//! Run-level errors.
//!
//! Every failure that ends a run is one of these variants, so callers branch
//! on a tagged value instead of unwinding. Per-test-case failures never show
//! up here: they are recorded in the [`sim_outcome::Outcome`].

use std::io;
use std::path::PathBuf;

use sim_channel::Crashed;
use sim_outcome::CoverageError;

use crate::recipe::GenError;
use crate::runner::RunnerError;

/// A failure that terminates a run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("invalid test filter {pattern:?}: {source}")]
    Filter {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("cannot read manifest {}: {message}", path.display())]
    Manifest { path: PathBuf, message: String },

    #[error("cannot scan {}: {source}", path.display())]
    Discovery {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot create expectation directory {}: {source}", path.display())]
    ExpectationDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot list expectation files in {}: {source}", path.display())]
    ExpectationScan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("crashed while running the test generator of recipe {recipe:?}: {source}")]
    Generator {
        recipe: String,
        #[source]
        source: GenError,
    },

    #[error("test generation for recipe {recipe:?} was cancelled")]
    Cancelled { recipe: String },

    #[error("recipe {recipe:?} emitted test with duplicate name {test:?}")]
    DuplicateTestName { recipe: String, test: String },

    #[error(
        "recipe {recipe:?} emitted test {test:?} which maps to the same expectation file as {other:?}: {}",
        path.display()
    )]
    ExpectationCollision {
        recipe: String,
        test: String,
        other: String,
        path: PathBuf,
    },

    #[error(
        "test {test:?} of recipe {recipe:?} has the same full name {name:?} as test {other_test:?} of recipe {other_recipe:?}"
    )]
    AmbiguousTestName {
        name: String,
        recipe: String,
        test: String,
        other_recipe: String,
        other_test: String,
    },

    #[error("cannot {action} expectation file {}: {source}", path.display())]
    Reconcile {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error("cannot create coverage directory: {source}")]
    CoverageDir {
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Coverage(#[from] CoverageError),

    #[error("cannot start {thread}: {source}")]
    Spawn {
        thread: String,
        #[source]
        source: io::Error,
    },

    #[error("{thread} panicked")]
    Panicked { thread: String },

    #[error(transparent)]
    ChannelCrashed(#[from] Crashed),

    #[error("cannot write report: {source}")]
    Report {
        #[source]
        source: io::Error,
    },

    #[error("cannot write outcome to {}: {source}", path.display())]
    Dump {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl RunError {
    /// Errors that only echo a crash someone else started.
    pub fn is_secondary(&self) -> bool {
        matches!(self, RunError::ChannelCrashed(_))
    }

    /// Pick the failure that started a crash.
    ///
    /// Returns the first error that is not a secondary channel crash,
    /// falling back to `first`.
    pub fn original(first: RunError, rest: impl IntoIterator<Item = RunError>) -> RunError {
        if !first.is_secondary() {
            return first;
        }
        rest.into_iter()
            .find(|error| !error.is_secondary())
            .unwrap_or(first)
    }

    pub(crate) fn report(source: io::Error) -> Self {
        RunError::Report { source }
    }
}
