//! Run configuration.

use std::fmt;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::thread;

/// Smallest channel capacity picked when none is configured.
const MIN_CHANNEL_CAPACITY: usize = 16;

/// Whether a run verifies or regenerates expectations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// Verify recorded expectations; report stale files.
    #[default]
    Check,
    /// Regenerate expectations and delete stale files.
    Train,
}

impl Mode {
    pub fn is_train(self) -> bool {
        matches!(self, Mode::Train)
    }

    /// Value passed to child processes.
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Check => "check",
            Mode::Train => "train",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Check => f.write_str("CHECK"),
            Mode::Train => f.write_str("TRAIN"),
        }
    }
}

/// Configuration for one run.
#[derive(Clone, Debug, Default)]
pub struct RunConfig {
    pub mode: Mode,
    /// `recipe` or `recipe.test` glob patterns; empty runs everything.
    pub filters: Vec<String>,
    /// Print one line per test case instead of progress glyphs.
    pub verbose: bool,
    /// Worker count. `None` uses every available processing unit.
    pub jobs: Option<NonZeroUsize>,
    /// Capacity of both channels. `None` scales with the worker count.
    pub channel_capacity: Option<usize>,
    /// Write the final outcome here as JSON.
    pub json_output: Option<PathBuf>,
}

impl RunConfig {
    pub fn new(mode: Mode) -> Self {
        RunConfig {
            mode,
            ..RunConfig::default()
        }
    }

    /// Number of workers for this run, fixed for its lifetime.
    pub fn jobs(&self) -> usize {
        self.jobs.map_or_else(
            || {
                thread::available_parallelism()
                    .map(NonZeroUsize::get)
                    .unwrap_or(1)
            },
            NonZeroUsize::get,
        )
    }

    /// Channel capacity for a run with `jobs` workers.
    pub fn channel_capacity(&self, jobs: usize) -> usize {
        self.channel_capacity
            .unwrap_or_else(|| jobs.saturating_mul(4).max(MIN_CHANNEL_CAPACITY))
    }
}
