use super::*;
use crate::testing::{Behavior, ScriptedFactory};
use crate::Mode;
use pretty_assertions::assert_eq;
use sim_channel::ChannelState;
use sim_outcome::CoverageData;

struct Pipeline {
    descs: Arc<Channel<Description>>,
    results: Arc<Channel<Outcome>>,
}

impl Pipeline {
    fn new(workers: usize) -> Self {
        Pipeline {
            descs: Arc::new(Channel::bounded(16, 1)),
            results: Arc::new(Channel::bounded(16, workers)),
        }
    }

    fn start(&self, size: usize, factory: &ScriptedFactory, coverage: bool) -> WorkerPool {
        WorkerPool::start(size, factory, &self.descs, &self.results, coverage).unwrap()
    }

    fn feed(&self, tests: &[&str]) {
        for test in tests {
            self.descs.put(Description::new("r", *test)).unwrap();
        }
        self.descs.dec_writer();
    }

    /// Merge every fragment until the result channel closes.
    fn collect(&self) -> Outcome {
        let mut outcome = Outcome::new();
        while let Some(fragment) = self.results.get().unwrap() {
            outcome.merge(fragment);
        }
        outcome
    }
}

#[test]
fn test_pool_runs_every_test() {
    let pipeline = Pipeline::new(3);
    let factory = ScriptedFactory::new(Mode::Check);
    let mut pool = pipeline.start(3, &factory, false);
    assert_eq!(pool.len(), 3);

    pipeline.feed(&["a", "b", "c", "d", "e"]);
    let outcome = pipeline.collect();

    assert_eq!(outcome.summary.executed, 5);
    assert_eq!(outcome.passed(), 5);
    assert_eq!(pipeline.results.state(), ChannelState::Closed);
    assert!(pool.join().is_empty());
    assert!(pool.is_empty());
    assert_eq!(factory.finished(), vec![0, 1, 2]);
    assert!(pool.coverage_files().is_empty());
}

#[test]
fn test_test_failures_do_not_stop_workers() {
    let pipeline = Pipeline::new(2);
    let factory = ScriptedFactory::new(Mode::Check)
        .with("r.bad", Behavior::Fail)
        .with("r.worse", Behavior::Crash);
    let pool = pipeline.start(2, &factory, false);

    pipeline.feed(&["ok", "bad", "worse", "fine"]);
    let outcome = pipeline.collect();

    assert_eq!(outcome.passed(), 2);
    assert_eq!(outcome.failed(), 1);
    assert_eq!(outcome.crashed(), 1);
    assert_eq!(factory.ran(), vec!["r.bad", "r.fine", "r.ok", "r.worse"]);
    assert!(pool.close().is_empty());
}

#[test]
fn test_launch_failure_crashes_both_channels() {
    let pipeline = Pipeline::new(2);
    let factory = ScriptedFactory::new(Mode::Check).with("r.missing", Behavior::LaunchError);
    let mut pool = pipeline.start(2, &factory, false);

    pipeline.feed(&["missing"]);
    let mut crashed = false;
    loop {
        match pipeline.results.get() {
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(_) => {
                crashed = true;
                break;
            }
        }
    }

    assert!(crashed);
    assert_eq!(pipeline.descs.state(), ChannelState::Crashed);
    let mut errors = pool.join().into_iter();
    let first = errors.next().unwrap();
    assert!(matches!(
        RunError::original(first, errors),
        RunError::Runner(crate::RunnerError::Launch { .. })
    ));
}

#[test]
fn test_panicking_worker_crashes_channels() {
    let pipeline = Pipeline::new(1);
    let factory = ScriptedFactory::new(Mode::Check).with("r.explode", Behavior::Panic);
    let mut pool = pipeline.start(1, &factory, false);

    pipeline.feed(&["explode"]);
    assert!(pipeline.results.get().is_err());

    let errors = pool.join();
    assert!(matches!(
        errors.as_slice(),
        [RunError::Panicked { thread }] if thread == "simtest-worker-0"
    ));
}

#[test]
fn test_coverage_files_survive_until_close() {
    let pipeline = Pipeline::new(2);
    let factory = ScriptedFactory::new(Mode::Check);
    let mut pool = pipeline.start(2, &factory, true);

    pipeline.feed(&["a", "b", "c"]);
    pipeline.collect();
    assert!(pool.join().is_empty());

    let files = pool.coverage_files().to_vec();
    assert_eq!(files.len(), 2);
    let mut merged = CoverageData::new();
    for file in &files {
        merged.merge(CoverageData::load(file).unwrap());
    }
    assert_eq!(merged.covered_lines(), 2);
    assert_eq!(merged.total_lines(), 4);

    let dir = files[0].parent().unwrap().to_path_buf();
    assert!(dir.is_dir());
    assert!(pool.close().is_empty());
    assert!(!dir.exists());
}

#[test]
fn test_drop_stops_idle_workers() {
    let pipeline = Pipeline::new(2);
    let factory = ScriptedFactory::new(Mode::Check);
    let pool = pipeline.start(2, &factory, true);
    let dir = pool.coverage_files()[0].parent().unwrap().to_path_buf();

    drop(pool);

    assert_eq!(pipeline.descs.state(), ChannelState::Crashed);
    assert!(!dir.exists());
    assert!(factory.ran().is_empty());
}
