//! simtest - parallel simulation tests for recipe repositories.
//!
//! Runs every test case a recipe's generator produces, in CHECK mode
//! (verify recorded expectations) or TRAIN mode (regenerate them).
//!
//! # Architecture
//!
//! ```text
//! Enumerator ──► description channel ──► Worker pool ──► result channel ──► Aggregator
//!  (1 thread)                          (N threads, one          (1 thread: merge,
//!                                       child process per        live report,
//!                                       test case)               final summary)
//! ```
//!
//! The orchestrator owns the lifecycle: it starts the workers, runs the
//! enumerator and aggregator concurrently, crashes both channels on any
//! unhandled failure, and always joins every worker before removing the
//! temporary coverage storage.

pub mod commands;
pub mod config;
pub mod enumerate;
mod error;
pub mod filter;
pub mod orchestrate;
pub mod recipe;
pub mod report;
pub mod runner;
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::{Mode, RunConfig};
pub use error::RunError;
pub use orchestrate::run;
pub use recipe::{GenError, ModuleInfo, Recipe, RecipeSet, TestCase, TestCaseSource, TestCases};
pub use report::RunReport;
pub use runner::{ProcessRunner, ProcessRunnerFactory, Runner, RunnerError, RunnerFactory};
pub use sim_outcome::{CoverageData, Description, Outcome, TestResult, TestStatus};

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Call this once at startup. Safe to call multiple times.
/// Enable with `RUST_LOG=simtest=debug`; set `SIMTEST_LOG_TREE=1` for
/// indented span trees. Logs go to stderr so they never interleave with the
/// progress report on stdout.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        // Only initialize if RUST_LOG is set
        if std::env::var("RUST_LOG").is_err() {
            return;
        }
        let filter = EnvFilter::from_default_env();
        let registry = tracing_subscriber::registry().with(filter);
        if std::env::var_os("SIMTEST_LOG_TREE").is_some() {
            registry
                .with(tracing_tree::HierarchicalLayer::new(2).with_targets(true))
                .init();
        } else {
            registry
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_level(true)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    });
}
