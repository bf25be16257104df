//! The run lifecycle.
//!
//! ```text
//! INIT ──► RUNNING ──► DRAINING ──► SUCCESS ──► CLEANUP
//!             │            │                       ▲
//!             └────────────┴──► CRASHED ───────────┘
//! ```
//!
//! - INIT builds the run context: both channels, the worker pool, and the
//!   master outcome seeded with the uncovered modules.
//! - RUNNING runs the enumerator on its own thread while the calling thread
//!   aggregates. Any failure crashes both channels.
//! - DRAINING ends when every worker has released the result channel.
//! - CLEANUP joins every worker before the coverage directory is removed,
//!   whether or not the run crashed. A crashed run then surfaces its original
//!   error.

use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use sim_channel::Channel;
use sim_outcome::{Description, Outcome};

use crate::enumerate::{enumerate, Enumeration};
use crate::filter::TestFilter;
use crate::recipe::RecipeSet;
use crate::report::{aggregate, display_width, merge_coverage, Reporter, RunReport};
use crate::runner::RunnerFactory;
use crate::worker::{CrashOnPanic, WorkerPool};
use crate::{RunConfig, RunError};

const ENUMERATOR_THREAD: &str = "simtest-enumerator";

/// State shared by every party of one run.
struct RunContext<'a> {
    recipes: &'a RecipeSet,
    config: &'a RunConfig,
    filter: TestFilter,
    descs: Arc<Channel<Description>>,
    results: Arc<Channel<Outcome>>,
    pool: WorkerPool,
    /// Written by the aggregator only.
    outcome: Outcome,
    started: Instant,
}

impl<'a> RunContext<'a> {
    fn start(
        recipes: &'a RecipeSet,
        factory: &dyn RunnerFactory,
        config: &'a RunConfig,
    ) -> Result<Self, RunError> {
        let started = Instant::now();
        let filter = TestFilter::compile(&config.filters)?;
        let jobs = config.jobs();
        let capacity = config.channel_capacity(jobs);
        let descs = Arc::new(Channel::bounded(capacity, 1));
        let results = Arc::new(Channel::bounded(capacity, jobs));

        let mut outcome = Outcome::new();
        outcome.uncovered_modules = recipes.uncovered_modules();

        // Coverage of a partial run would misrepresent the whole.
        let collect_coverage = filter.is_empty();
        let pool = WorkerPool::start(jobs, factory, &descs, &results, collect_coverage)?;

        tracing::debug!(
            mode = %config.mode,
            recipes = recipes.len(),
            jobs,
            capacity,
            filtered = !filter.is_empty(),
            "run started"
        );
        Ok(RunContext {
            recipes,
            config,
            filter,
            descs,
            results,
            pool,
            outcome,
            started,
        })
    }

    /// Run the enumerator and the aggregator until the result channel
    /// closes or either party fails.
    fn pipeline<W: Write>(&mut self, reporter: &mut Reporter<W>) -> Result<Enumeration, RunError> {
        let recipes = self.recipes;
        let mode = self.config.mode;
        let filter = &self.filter;
        let descs = &*self.descs;
        let results = &*self.results;
        let outcome = &mut self.outcome;

        thread::scope(|scope| {
            let spawned = thread::Builder::new()
                .name(ENUMERATOR_THREAD.to_string())
                .spawn_scoped(scope, move || {
                    let _guard = CrashOnPanic::new("enumerator", descs, results);
                    let enumerated = enumerate(recipes, filter, mode, descs);
                    if let Err(error) = &enumerated {
                        crash(descs, results, "enumerator", error);
                    }
                    enumerated
                });
            let enumerator = match spawned {
                Ok(handle) => handle,
                Err(source) => {
                    descs.crash("cannot start enumerator");
                    results.crash("cannot start enumerator");
                    return Err(RunError::Spawn {
                        thread: ENUMERATOR_THREAD.to_string(),
                        source,
                    });
                }
            };

            let aggregated = {
                let _guard = CrashOnPanic::new("aggregator", descs, results);
                aggregate(results, outcome, reporter)
            };
            if let Err(error) = &aggregated {
                crash(descs, results, "aggregator", error);
            }

            let enumerated = enumerator.join().unwrap_or_else(|_| {
                Err(RunError::Panicked {
                    thread: ENUMERATOR_THREAD.to_string(),
                })
            });
            match (enumerated, aggregated) {
                (Ok(enumeration), Ok(())) => Ok(enumeration),
                (Err(error), aggregated) => Err(RunError::original(error, aggregated.err())),
                (Ok(_), Err(error)) => Err(error),
            }
        })
    }

    /// Finish a run whose workers all exited cleanly.
    fn complete<W: Write>(
        &mut self,
        enumeration: Enumeration,
        reporter: &mut Reporter<W>,
    ) -> Result<RunReport, RunError> {
        let coverage = if self.filter.is_empty() {
            Some(merge_coverage(self.pool.coverage_files())?)
        } else {
            None
        };

        let mut outcome = std::mem::take(&mut self.outcome);
        let mode = self.config.mode;
        let rewritten = if mode.is_train() {
            enumeration.write_expectations(&outcome)?
        } else {
            0
        };
        // Payloads are on disk now; the outcome only keeps the verdicts.
        for result in outcome.results.values_mut() {
            result.expectation = None;
        }
        outcome
            .unused_expectation_files
            .extend(enumeration.unused_expectation_files);

        let report = RunReport {
            mode,
            outcome,
            coverage,
            elapsed: self.started.elapsed(),
            rewritten,
        };
        reporter.final_summary(&report).map_err(RunError::report)?;
        Ok(report)
    }
}

fn crash(
    descs: &Channel<Description>,
    results: &Channel<Outcome>,
    party: &str,
    error: &RunError,
) {
    if error.is_secondary() {
        tracing::debug!(party, %error, "stopping after crash");
    } else {
        tracing::warn!(party, %error, "run crashed");
    }
    let reason = format!("{party} failed: {error}");
    descs.crash(reason.as_str());
    results.crash(reason);
}

/// Run every selected test case of `recipes`, reporting to `out`.
///
/// Returns the run's report once cleanup is done. A crashed run returns the
/// error that started the crash, after every worker has been joined and the
/// temporary coverage storage removed.
pub fn run<W: Write>(
    recipes: &RecipeSet,
    factory: &dyn RunnerFactory,
    config: &RunConfig,
    out: W,
) -> Result<RunReport, RunError> {
    let mut ctx = RunContext::start(recipes, factory, config)?;
    let mut reporter = Reporter::new(out, config.verbose, display_width());

    let running = ctx.pipeline(&mut reporter);

    // Workers must be gone before their coverage files are read or removed.
    tracing::debug!(workers = ctx.pool.len(), "joining workers");
    let worker_errors = ctx.pool.join();
    let result = match running {
        Ok(enumeration) => {
            let mut errors = worker_errors.into_iter();
            match errors.next() {
                Some(first) => Err(RunError::original(first, errors)),
                None => ctx.complete(enumeration, &mut reporter),
            }
        }
        Err(error) => Err(RunError::original(error, worker_errors)),
    };

    for error in ctx.pool.close() {
        tracing::warn!(%error, "worker failed during cleanup");
    }
    tracing::debug!(ok = result.is_ok(), "run finished");
    result
}
