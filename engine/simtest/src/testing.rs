//! In-process stand-ins for the recipe loader and the test runner.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use sim_outcome::{CoverageData, Description, FileCoverage, Outcome, TestResult};

use crate::recipe::{GenError, Recipe, RecipeSet, TestCase, TestCaseSource, TestCases};
use crate::runner::{Runner, RunnerError, RunnerFactory};
use crate::Mode;

enum GenFailure {
    Cancelled,
    Failed(String),
}

/// Yields a fixed list of test cases, optionally failing after the last one.
pub(crate) struct StaticSource {
    cases: Vec<TestCase>,
    failure: Option<GenFailure>,
}

impl StaticSource {
    pub(crate) fn new(cases: impl IntoIterator<Item = TestCase>) -> Self {
        StaticSource {
            cases: cases.into_iter().collect(),
            failure: None,
        }
    }

    pub(crate) fn failing_after(
        cases: impl IntoIterator<Item = TestCase>,
        message: &str,
    ) -> Self {
        StaticSource {
            failure: Some(GenFailure::Failed(message.to_string())),
            ..StaticSource::new(cases)
        }
    }

    pub(crate) fn cancelled() -> Self {
        StaticSource {
            failure: Some(GenFailure::Cancelled),
            ..StaticSource::new([])
        }
    }
}

impl TestCaseSource for StaticSource {
    fn gen_tests(&self) -> Result<TestCases<'_>, GenError> {
        let failure = self.failure.as_ref().map(|f| {
            Err(match f {
                GenFailure::Cancelled => GenError::Cancelled,
                GenFailure::Failed(message) => GenError::Failed(message.clone()),
            })
        });
        Ok(Box::new(self.cases.iter().cloned().map(Ok).chain(failure)))
    }
}

/// A recipe named `name` whose expectations live in `root/<name>.expected`.
pub(crate) fn recipe(root: &Path, name: &str, tests: &[&str]) -> Recipe {
    let dir = root.join(format!("{name}.expected"));
    let cases: Vec<_> = tests.iter().map(|t| TestCase::in_dir(&dir, *t)).collect();
    Recipe::new(name, dir, StaticSource::new(cases))
}

/// The recipe of `set` called `name`.
pub(crate) fn named<'a>(set: &'a RecipeSet, name: &str) -> &'a Recipe {
    set.recipes()
        .find(|recipe| recipe.name() == name)
        .unwrap_or_else(|| panic!("no recipe named {name:?}"))
}

/// What a scripted runner does with one test case.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Behavior {
    Pass,
    Fail,
    Crash,
    LaunchError,
    Panic,
}

#[derive(Default)]
struct Script {
    behaviors: FxHashMap<String, Behavior>,
    ran: Mutex<Vec<String>>,
    finished: Mutex<Vec<usize>>,
    released: Mutex<Vec<usize>>,
}

/// Runs test cases in-process according to a script keyed by `recipe.test`.
///
/// Unscripted tests pass. In TRAIN mode passing tests carry an expectation
/// payload naming the test, and every run records one coverage line per
/// recipe when a coverage file is supplied.
#[derive(Clone)]
pub(crate) struct ScriptedFactory {
    script: Arc<Script>,
    mode: Mode,
}

impl ScriptedFactory {
    pub(crate) fn new(mode: Mode) -> Self {
        ScriptedFactory {
            script: Arc::new(Script::default()),
            mode,
        }
    }

    pub(crate) fn with(mut self, full_name: &str, behavior: Behavior) -> Self {
        if let Some(script) = Arc::get_mut(&mut self.script) {
            script.behaviors.insert(full_name.to_string(), behavior);
        }
        self
    }

    /// Full names of every test run so far, sorted.
    pub(crate) fn ran(&self) -> Vec<String> {
        let mut ran = self.script.ran.lock().clone();
        ran.sort();
        ran
    }

    /// Workers whose runner was finished, sorted.
    pub(crate) fn finished(&self) -> Vec<usize> {
        let mut finished = self.script.finished.lock().clone();
        finished.sort_unstable();
        finished
    }

    /// Workers whose runner was dropped, sorted. A runner is dropped when its
    /// worker thread exits.
    pub(crate) fn released(&self) -> Vec<usize> {
        let mut released = self.script.released.lock().clone();
        released.sort_unstable();
        released
    }
}

/// Expectation payload a scripted TRAIN run produces for `full_name`.
pub(crate) fn payload(full_name: &str) -> String {
    format!("[\"{full_name}\"]\n")
}

impl RunnerFactory for ScriptedFactory {
    fn runner(&self, worker: usize, coverage_file: Option<&Path>) -> Box<dyn Runner> {
        Box::new(ScriptedRunner {
            factory: self.clone(),
            worker,
            coverage_file: coverage_file.map(Path::to_path_buf),
        })
    }
}

struct ScriptedRunner {
    factory: ScriptedFactory,
    worker: usize,
    coverage_file: Option<PathBuf>,
}

impl ScriptedRunner {
    fn record_coverage(&self, desc: &Description) -> io::Result<()> {
        let Some(path) = &self.coverage_file else {
            return Ok(());
        };
        let mut data = CoverageData::new();
        data.add_file(
            format!("{}.py", desc.recipe_name),
            FileCoverage {
                executable: [1, 2, 3, 4].into(),
                executed: [1, 2].into(),
            },
        );
        let mut line = serde_json::to_string(&data)?;
        line.push('\n');
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?
            .write_all(line.as_bytes())
    }
}

impl Runner for ScriptedRunner {
    fn run(&mut self, desc: &Description) -> Result<Outcome, RunnerError> {
        let full_name = desc.full_name();
        let behavior = self
            .factory
            .script
            .behaviors
            .get(&full_name)
            .copied()
            .unwrap_or(Behavior::Pass);
        let duration = Duration::from_millis(5);

        let result = match behavior {
            Behavior::Pass if self.factory.mode.is_train() => {
                TestResult::passed(duration).with_expectation(payload(&full_name))
            }
            Behavior::Pass => TestResult::passed(duration),
            Behavior::Fail => TestResult::failed("expectation mismatch", duration),
            Behavior::Crash => TestResult::crashed("child died", duration),
            Behavior::LaunchError => {
                return Err(RunnerError::Launch {
                    program: "scripted".to_string(),
                    source: io::Error::new(io::ErrorKind::NotFound, "no such program"),
                });
            }
            Behavior::Panic => panic!("scripted panic in {full_name}"),
        };

        self.record_coverage(desc)
            .map_err(|source| RunnerError::Launch {
                program: "scripted".to_string(),
                source,
            })?;
        self.factory.script.ran.lock().push(full_name);
        Ok(Outcome::single(desc, result))
    }

    fn finish(&mut self) -> Result<(), RunnerError> {
        self.factory.script.finished.lock().push(self.worker);
        Ok(())
    }
}

impl Drop for ScriptedRunner {
    fn drop(&mut self) {
        self.factory.script.released.lock().push(self.worker);
    }
}
