//! The `run` and `train` commands.

use std::fs;
use std::io;
use std::path::Path;

use sim_outcome::Outcome;

use crate::recipe::RecipeRepo;
use crate::runner::ProcessRunnerFactory;
use crate::{orchestrate, RunConfig, RunError};

/// Manifest looked up when none is given.
pub const DEFAULT_MANIFEST: &str = "simtest.json";

/// Run the simulation tests of the repository described by `manifest`.
///
/// Returns the process exit code: 0 when everything passed, 1 on failures
/// or a crashed run, 2 when no test ran.
pub fn run_simulation(manifest: &Path, config: &RunConfig) -> i32 {
    match simulate(manifest, config) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            1
        }
    }
}

fn simulate(manifest: &Path, config: &RunConfig) -> Result<i32, RunError> {
    let repo = RecipeRepo::load(manifest)?;
    let factory = ProcessRunnerFactory::new(repo.run_command(), config.mode);
    let stdout = io::stdout();
    let report = orchestrate::run(repo.recipes(), &factory, config, stdout.lock())?;

    if let Some(path) = &config.json_output {
        dump_outcome(&report.outcome, path)?;
    }
    Ok(report.exit_code())
}

/// Write `outcome` to `path` as pretty-printed JSON.
pub fn dump_outcome(outcome: &Outcome, path: &Path) -> Result<(), RunError> {
    let dump_error = |source| RunError::Dump {
        path: path.to_path_buf(),
        source,
    };
    let mut json = serde_json::to_vec_pretty(outcome).map_err(|e| dump_error(io::Error::from(e)))?;
    json.push(b'\n');
    fs::write(path, json).map_err(dump_error)
}
