//! Test case execution.
//!
//! A [`Runner`] executes one test case at a time and turns it into an
//! [`Outcome`] fragment. Failures of the test case itself are data (a failed
//! or crashed [`TestResult`]); only plumbing failures are returned as errors.
//!
//! [`ProcessRunner`] gives every test case its own child process, so a test
//! that aborts, leaks, or exhausts memory cannot take the orchestrator down.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sim_outcome::{CoverageData, CoverageError, Description, Outcome, TestResult};

use crate::Mode;

/// Recipe name, for both the generator and the runner.
pub const ENV_RECIPE: &str = "SIMTEST_RECIPE";
/// Test case name.
pub const ENV_TEST: &str = "SIMTEST_TEST";
/// `check` or `train`.
pub const ENV_MODE: &str = "SIMTEST_MODE";
/// JSON-lines file the child appends coverage records to.
pub const ENV_COVERAGE_FILE: &str = "SIMTEST_COVERAGE_FILE";

/// Lines of child stderr kept in a diagnostic.
const STDERR_TAIL_LINES: usize = 20;

/// Plumbing failure of a runner. Escalates to a run crash.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("cannot launch test process {program:?}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Coverage(#[from] CoverageError),
}

/// Executes test cases for one worker.
pub trait Runner: Send {
    /// Execute `desc` and return its single-result fragment.
    fn run(&mut self, desc: &Description) -> Result<Outcome, RunnerError>;

    /// Called once after the worker's last test case.
    fn finish(&mut self) -> Result<(), RunnerError> {
        Ok(())
    }
}

/// Builds one runner per worker.
pub trait RunnerFactory {
    /// A runner for worker `worker` that writes coverage to `coverage_file`,
    /// if coverage is collected.
    fn runner(&self, worker: usize, coverage_file: Option<&Path>) -> Box<dyn Runner>;
}

/// Creates [`ProcessRunner`]s for a command line.
#[derive(Clone, Debug)]
pub struct ProcessRunnerFactory {
    command: Arc<[String]>,
    mode: Mode,
}

impl ProcessRunnerFactory {
    pub fn new(command: &[String], mode: Mode) -> Self {
        ProcessRunnerFactory {
            command: Arc::from(command),
            mode,
        }
    }
}

impl RunnerFactory for ProcessRunnerFactory {
    fn runner(&self, worker: usize, coverage_file: Option<&Path>) -> Box<dyn Runner> {
        Box::new(ProcessRunner {
            command: Arc::clone(&self.command),
            mode: self.mode,
            worker,
            coverage_file: coverage_file.map(Path::to_path_buf),
        })
    }
}

/// Runs each test case in a fresh child process.
///
/// The child learns which test to run from `SIMTEST_RECIPE`, `SIMTEST_TEST`
/// and `SIMTEST_MODE`, and prints an [`Outcome`] fragment as JSON on stdout.
#[derive(Debug)]
pub struct ProcessRunner {
    command: Arc<[String]>,
    mode: Mode,
    worker: usize,
    coverage_file: Option<PathBuf>,
}

impl Runner for ProcessRunner {
    fn run(&mut self, desc: &Description) -> Result<Outcome, RunnerError> {
        let Some((program, args)) = self.command.split_first() else {
            return Err(RunnerError::Launch {
                program: String::new(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "run_command is empty"),
            });
        };

        let mut command = Command::new(program);
        command
            .args(args)
            .env(ENV_RECIPE, &desc.recipe_name)
            .env(ENV_TEST, &desc.test_name)
            .env(ENV_MODE, self.mode.as_str())
            .stdin(Stdio::null());
        if let Some(path) = &self.coverage_file {
            // The child appends; make sure the file exists so it can.
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| CoverageError::Io {
                    path: path.clone(),
                    source,
                })?;
            command.env(ENV_COVERAGE_FILE, path);
        }

        tracing::trace!(worker = self.worker, test = %desc, "launching test process");
        let start = Instant::now();
        let output = command.output().map_err(|source| RunnerError::Launch {
            program: program.clone(),
            source,
        })?;
        let result = interpret_output(desc, &output, start.elapsed());
        Ok(Outcome::single(desc, result))
    }

    fn finish(&mut self) -> Result<(), RunnerError> {
        if let Some(path) = &self.coverage_file {
            let data = CoverageData::load(path)?;
            if !data.is_empty() {
                data.store(path)?;
            }
        }
        Ok(())
    }
}

/// Turn a finished child process into the test case's result.
///
/// Anything short of a clean exit with a well-formed fragment naming the
/// requested test is a crash of that test case.
fn interpret_output(desc: &Description, output: &Output, elapsed: Duration) -> TestResult {
    if !output.status.success() {
        return TestResult::crashed(
            format!(
                "test process exited with {}{}",
                output.status,
                stderr_tail(&output.stderr)
            ),
            elapsed,
        );
    }

    let mut fragment: Outcome = match serde_json::from_slice(&output.stdout) {
        Ok(fragment) => fragment,
        Err(e) => {
            return TestResult::crashed(
                format!(
                    "test process printed an invalid outcome: {e}{}",
                    stderr_tail(&output.stderr)
                ),
                elapsed,
            );
        }
    };

    let full_name = desc.full_name();
    match fragment.results.remove(&full_name) {
        Some(mut result) => {
            if result.duration.is_zero() {
                result.duration = elapsed;
            }
            result
        }
        None => TestResult::crashed(
            format!("test process reported no result for {full_name}"),
            elapsed,
        ),
    }
}

/// Last lines of a child's stderr, each prefixed with a newline so the
/// result can be appended to a message. Empty for empty stderr.
pub(crate) fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    let mut tail = String::new();
    for line in &lines[start..] {
        tail.push('\n');
        tail.push_str(line);
    }
    tail
}
