//! The worker pool.
//!
//! Each worker is a named thread owning one [`Runner`]. It pulls
//! descriptions until end-of-stream, puts one outcome fragment per test case,
//! then finalizes its runner and releases its writer slot on the result
//! channel. Any plumbing failure (channel crash, launch failure, coverage
//! I/O, panic) crashes both channels so no other party blocks forever.
//!
//! Coverage files live in a temporary directory owned by the pool. The
//! directory is removed only after every worker has been joined.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use sim_channel::Channel;
use sim_outcome::{Description, Outcome};
use tempfile::TempDir;

use crate::runner::{Runner, RunnerFactory};
use crate::RunError;

struct Worker {
    id: usize,
    handle: JoinHandle<Result<(), RunError>>,
}

/// A fixed set of worker threads serving one run.
pub struct WorkerPool {
    workers: Vec<Worker>,
    coverage_dir: Option<TempDir>,
    coverage_files: Vec<PathBuf>,
    descs: Arc<Channel<Description>>,
    results: Arc<Channel<Outcome>>,
}

impl WorkerPool {
    /// Start `size` workers reading `descs` and writing `results`.
    ///
    /// `results` must have been created with `size` writers. With
    /// `collect_coverage`, every worker gets a private coverage file in a
    /// fresh temporary directory.
    pub fn start(
        size: usize,
        factory: &dyn RunnerFactory,
        descs: &Arc<Channel<Description>>,
        results: &Arc<Channel<Outcome>>,
        collect_coverage: bool,
    ) -> Result<Self, RunError> {
        let coverage_dir = if collect_coverage {
            let dir = tempfile::Builder::new()
                .prefix("simtest-coverage-")
                .tempdir()
                .map_err(|source| RunError::CoverageDir { source })?;
            Some(dir)
        } else {
            None
        };

        let mut pool = WorkerPool {
            workers: Vec::with_capacity(size),
            coverage_dir,
            coverage_files: Vec::new(),
            descs: Arc::clone(descs),
            results: Arc::clone(results),
        };

        for id in 0..size {
            let coverage_file = pool
                .coverage_dir
                .as_ref()
                .map(|dir| dir.path().join(format!("worker-{id}.jsonl")));
            let runner = factory.runner(id, coverage_file.as_deref());
            let descs = Arc::clone(descs);
            let results = Arc::clone(results);

            let spawned = thread::Builder::new()
                .name(thread_name(id))
                .spawn(move || worker_loop(id, runner, &descs, &results));
            match spawned {
                Ok(handle) => {
                    pool.workers.push(Worker { id, handle });
                    pool.coverage_files.extend(coverage_file);
                }
                Err(source) => {
                    let reason = format!("cannot start worker {id}");
                    pool.descs.crash(reason.as_str());
                    pool.results.crash(reason);
                    for error in pool.close() {
                        tracing::debug!(%error, "worker stopped after spawn failure");
                    }
                    return Err(RunError::Spawn {
                        thread: thread_name(id),
                        source,
                    });
                }
            }
        }

        tracing::debug!(workers = size, collect_coverage, "worker pool started");
        Ok(pool)
    }

    /// Number of running or unjoined workers.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Wait for every worker thread to exit.
    ///
    /// Returns each worker's failure. Only call this once the channels are
    /// closed or crashed; otherwise workers may wait forever.
    pub fn join(&mut self) -> Vec<RunError> {
        let mut errors = Vec::new();
        for worker in self.workers.drain(..) {
            match worker.handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(error)) => errors.push(error),
                Err(_) => errors.push(RunError::Panicked {
                    thread: thread_name(worker.id),
                }),
            }
        }
        errors
    }

    /// Coverage file of every started worker. Complete once the pool is
    /// joined.
    pub fn coverage_files(&self) -> &[PathBuf] {
        &self.coverage_files
    }

    /// Join every worker, then remove the coverage directory.
    pub fn close(mut self) -> Vec<RunError> {
        let errors = self.join();
        self.remove_coverage_dir();
        errors
    }

    fn remove_coverage_dir(&mut self) {
        debug_assert!(self.is_empty(), "coverage removed before join");
        let Some(dir) = self.coverage_dir.take() else {
            return;
        };
        let path = dir.path().to_path_buf();
        match dir.close() {
            Ok(()) => tracing::trace!(path = %path.display(), "coverage directory removed"),
            Err(error) => tracing::warn!(
                path = %path.display(),
                %error,
                "cannot remove coverage directory"
            ),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.is_empty() {
            tracing::debug!(workers = self.len(), "stopping workers of dropped pool");
            self.descs.crash("worker pool dropped");
            self.results.crash("worker pool dropped");
            for error in self.join() {
                tracing::debug!(%error, "worker stopped by pool drop");
            }
        }
        self.remove_coverage_dir();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers.len())
            .field("coverage_files", &self.coverage_files)
            .finish_non_exhaustive()
    }
}

fn thread_name(id: usize) -> String {
    format!("simtest-worker-{id}")
}

fn worker_loop(
    id: usize,
    mut runner: Box<dyn Runner>,
    descs: &Channel<Description>,
    results: &Channel<Outcome>,
) -> Result<(), RunError> {
    let _guard = CrashOnPanic::new(format!("worker {id}"), descs, results);

    let outcome = serve(id, runner.as_mut(), descs, results);
    if let Err(error) = &outcome {
        if !error.is_secondary() {
            tracing::error!(worker = id, %error, "worker failed");
        }
        let reason = format!("worker {id} failed: {error}");
        descs.crash(reason.as_str());
        results.crash(reason);
    }
    outcome
}

fn serve(
    id: usize,
    runner: &mut dyn Runner,
    descs: &Channel<Description>,
    results: &Channel<Outcome>,
) -> Result<(), RunError> {
    tracing::trace!(worker = id, "worker started");
    let mut executed = 0_usize;
    while let Some(desc) = descs.get()? {
        let fragment = runner.run(&desc)?;
        results.put(fragment)?;
        executed += 1;
    }
    runner.finish()?;
    results.dec_writer();
    tracing::debug!(worker = id, executed, "worker finished");
    Ok(())
}

/// Crashes both channels if the party holding it unwinds.
pub(crate) struct CrashOnPanic<'a> {
    party: String,
    descs: &'a Channel<Description>,
    results: &'a Channel<Outcome>,
}

impl<'a> CrashOnPanic<'a> {
    pub(crate) fn new(
        party: impl Into<String>,
        descs: &'a Channel<Description>,
        results: &'a Channel<Outcome>,
    ) -> Self {
        CrashOnPanic {
            party: party.into(),
            descs,
            results,
        }
    }
}

impl Drop for CrashOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            let reason = format!("{} panicked", self.party);
            self.descs.crash(reason.as_str());
            self.results.crash(reason);
        }
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests;
