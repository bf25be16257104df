//! Recipe repositories described by a `simtest.json` manifest.
//!
//! Layout, relative to the manifest:
//!
//! ```text
//! simtest.json
//! recipes/                      top-level recipes, named by relative path
//!     deploy.py
//!     deploy.expected/          one expectation file per test case
//! recipe_modules/
//!     cq/                       module "cq"
//!         examples/full.py      recipe "cq:examples/full"
//!         tests/dry_run.py      recipe "cq:tests/dry_run"
//! ```
//!
//! Test generation and test execution are both delegated to commands named
//! in the manifest, so the repository can be written in any language.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;

use serde::Deserialize;

use super::{
    discover_recipes, GenError, ModuleInfo, Recipe, RecipeSet, TestCase, TestCaseSource, TestCases,
};
use crate::runner::{stderr_tail, ENV_RECIPE};
use crate::RunError;

/// Environment variable holding the recipe's file path for the generator.
pub const ENV_RECIPE_PATH: &str = "SIMTEST_RECIPE_PATH";

/// Sub-directories of a module that hold its recipes.
const MODULE_RECIPE_DIRS: [&str; 2] = ["examples", "tests"];

/// Contents of `simtest.json`.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default = "default_recipes_dir")]
    pub recipes_dir: PathBuf,
    #[serde(default = "default_modules_dir")]
    pub modules_dir: PathBuf,
    /// Extension of recipe files, without the dot.
    pub recipe_extension: String,
    /// Prints one test name per line for `$SIMTEST_RECIPE`.
    pub gen_command: Vec<String>,
    /// Runs one test case and prints its outcome fragment as JSON.
    pub run_command: Vec<String>,
    /// Modules exempt from uncovered-module reporting.
    #[serde(default)]
    pub sloppy_coverage_modules: BTreeSet<String>,
}

fn default_recipes_dir() -> PathBuf {
    PathBuf::from("recipes")
}

fn default_modules_dir() -> PathBuf {
    PathBuf::from("recipe_modules")
}

/// A loaded recipe repository.
#[derive(Debug)]
pub struct RecipeRepo {
    manifest: Manifest,
    recipes: RecipeSet,
}

impl RecipeRepo {
    /// Load the manifest at `path` and discover every recipe it describes.
    pub fn load(path: &Path) -> Result<Self, RunError> {
        let manifest_error = |message: String| RunError::Manifest {
            path: path.to_path_buf(),
            message,
        };
        let text = fs::read_to_string(path).map_err(|e| manifest_error(e.to_string()))?;
        let manifest: Manifest =
            serde_json::from_str(&text).map_err(|e| manifest_error(e.to_string()))?;
        if manifest.gen_command.is_empty() {
            return Err(manifest_error("gen_command is empty".to_string()));
        }
        if manifest.run_command.is_empty() {
            return Err(manifest_error("run_command is empty".to_string()));
        }

        let root = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        let recipes = load_recipes(&root, &manifest)?;
        tracing::debug!(
            root = %root.display(),
            recipes = recipes.len(),
            modules = recipes.modules().len(),
            "loaded recipe repository"
        );

        Ok(RecipeRepo {
            manifest,
            recipes,
        })
    }

    pub fn recipes(&self) -> &RecipeSet {
        &self.recipes
    }

    /// Command line of the per-test-case runner.
    pub fn run_command(&self) -> &[String] {
        &self.manifest.run_command
    }
}

fn load_recipes(root: &Path, manifest: &Manifest) -> Result<RecipeSet, RunError> {
    let gen_command: Arc<[String]> = manifest.gen_command.clone().into();
    let extension = manifest.recipe_extension.as_str();
    let mut set = RecipeSet::new();

    for file in discover_recipes(&root.join(&manifest.recipes_dir), extension) {
        set.add_recipe(command_recipe(file.name, file.path, &gen_command));
    }

    for module in module_dirs(&root.join(&manifest.modules_dir))? {
        let Some(module_name) = module.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let mut recipe_count = 0;
        for sub in MODULE_RECIPE_DIRS {
            for file in discover_recipes(&module.join(sub), extension) {
                let name = format!("{module_name}:{sub}/{}", file.name);
                set.add_recipe(command_recipe(name, file.path, &gen_command));
                recipe_count += 1;
            }
        }
        set.add_module(ModuleInfo {
            name: module_name.to_string(),
            recipe_count,
            sloppy_coverage: manifest.sloppy_coverage_modules.contains(module_name),
        });
    }

    Ok(set)
}

/// Visible sub-directories of `modules_dir`, sorted. A missing directory
/// means the repository has no modules.
fn module_dirs(modules_dir: &Path) -> Result<Vec<PathBuf>, RunError> {
    let discovery_error = |source| RunError::Discovery {
        path: modules_dir.to_path_buf(),
        source,
    };
    let entries = match fs::read_dir(modules_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(discovery_error(e)),
    };

    let mut dirs = Vec::new();
    for entry in entries {
        let path = entry.map_err(discovery_error)?.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if path.is_dir() && !hidden {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn command_recipe(name: String, path: PathBuf, gen_command: &Arc<[String]>) -> Recipe {
    let expectation_dir = path.with_extension("expected");
    let source = CommandSource {
        command: Arc::clone(gen_command),
        recipe_name: name.clone(),
        recipe_path: path,
        expectation_dir: expectation_dir.clone(),
    };
    Recipe::new(name, expectation_dir, source)
}

/// Generates test cases by running the manifest's `gen_command`.
#[derive(Debug)]
pub struct CommandSource {
    command: Arc<[String]>,
    recipe_name: String,
    recipe_path: PathBuf,
    expectation_dir: PathBuf,
}

impl TestCaseSource for CommandSource {
    fn gen_tests(&self) -> Result<TestCases<'_>, GenError> {
        let Some((program, args)) = self.command.split_first() else {
            return Err(GenError::Failed("gen_command is empty".to_string()));
        };
        let output = Command::new(program)
            .args(args)
            .env(ENV_RECIPE, &self.recipe_name)
            .env(ENV_RECIPE_PATH, &self.recipe_path)
            .stdin(Stdio::null())
            .output()?;

        if !output.status.success() {
            if was_interrupted(output.status) {
                return Err(GenError::Cancelled);
            }
            return Err(GenError::Failed(format!(
                "test generator exited with {}{}",
                output.status,
                stderr_tail(&output.stderr)
            )));
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| GenError::Failed(format!("test generator printed invalid UTF-8: {e}")))?;
        let names: Vec<String> = stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect();

        let dir = self.expectation_dir.as_path();
        Ok(Box::new(
            names.into_iter().map(move |name| Ok(TestCase::in_dir(dir, name))),
        ))
    }
}

/// SIGINT, either delivered directly or reported by a shell as 128 + 2.
#[cfg(unix)]
fn was_interrupted(status: ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    status.signal() == Some(2) || status.code() == Some(130)
}

#[cfg(not(unix))]
fn was_interrupted(status: ExitStatus) -> bool {
    status.code() == Some(130)
}
