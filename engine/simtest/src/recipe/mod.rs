//! The recipe collection a run enumerates.
//!
//! Loading recipes is someone else's job; this module only fixes the
//! capability the engine needs from each one: a [`TestCaseSource`] that
//! yields test cases, plus the recipe's name and expectation directory.
//! [`repo::RecipeRepo`] builds a [`RecipeSet`] from a manifest on disk.

mod discovery;
pub mod repo;

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;

pub use discovery::{discover_recipes, RecipeFile};
pub use repo::RecipeRepo;

/// Extension of expectation files.
pub const EXPECTATION_EXTENSION: &str = "json";

/// One test case produced by a recipe's generator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestCase {
    pub name: String,
    /// Where this test case's expectation lives.
    pub expect_file: PathBuf,
}

impl TestCase {
    pub fn new(name: impl Into<String>, expect_file: impl Into<PathBuf>) -> Self {
        TestCase {
            name: name.into(),
            expect_file: expect_file.into(),
        }
    }

    /// A test case whose expectation file sits in `dir`, named after the test.
    pub fn in_dir(dir: &Path, name: impl Into<String>) -> Self {
        let name = name.into();
        let expect_file = dir.join(expectation_file_name(&name));
        TestCase { name, expect_file }
    }
}

/// File name of a test's expectation: the test name with every character
/// outside `[A-Za-z0-9_.-]` replaced by `_`, plus `.json`.
///
/// Distinct names can map to the same file (`"a b"` and `"a_b"`); the
/// enumerator rejects that.
pub fn expectation_file_name(test_name: &str) -> String {
    let mut name: String = test_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    name.push('.');
    name.push_str(EXPECTATION_EXTENSION);
    name
}

/// Failure of a recipe's test generator.
#[derive(Debug, thiserror::Error)]
pub enum GenError {
    /// Generation was interrupted; the run stops without blaming the recipe.
    #[error("test generation cancelled")]
    Cancelled,
    #[error("{0}")]
    Failed(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Lazy, finite, non-restartable sequence of test cases.
pub type TestCases<'a> = Box<dyn Iterator<Item = Result<TestCase, GenError>> + 'a>;

/// Something that can produce a recipe's test cases.
///
/// Implementations run user-authored code: any error they return is fatal
/// to the run.
pub trait TestCaseSource: Send + Sync {
    fn gen_tests(&self) -> Result<TestCases<'_>, GenError>;
}

/// A testable recipe.
pub struct Recipe {
    name: String,
    expectation_dir: PathBuf,
    source: Box<dyn TestCaseSource>,
}

impl Recipe {
    pub fn new(
        name: impl Into<String>,
        expectation_dir: impl Into<PathBuf>,
        source: impl TestCaseSource + 'static,
    ) -> Self {
        Recipe {
            name: name.into(),
            expectation_dir: expectation_dir.into(),
            source: Box::new(source),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expectation_dir(&self) -> &Path {
        &self.expectation_dir
    }

    /// Start the recipe's test generator.
    pub fn gen_tests(&self) -> Result<TestCases<'_>, GenError> {
        self.source.gen_tests()
    }

    /// Expectation files currently on disk for this recipe.
    ///
    /// A missing expectation directory holds no files.
    pub fn expectation_paths(&self) -> io::Result<FxHashSet<PathBuf>> {
        let entries = match fs::read_dir(&self.expectation_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(FxHashSet::default()),
            Err(e) => return Err(e),
        };

        let mut paths = FxHashSet::default();
        for entry in entries {
            let path = entry?.path();
            if path.is_file()
                && path
                    .extension()
                    .is_some_and(|e| e == EXPECTATION_EXTENSION)
            {
                paths.insert(path);
            }
        }
        Ok(paths)
    }
}

impl std::fmt::Debug for Recipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recipe")
            .field("name", &self.name)
            .field("expectation_dir", &self.expectation_dir)
            .finish_non_exhaustive()
    }
}

/// A module of the repository, for uncovered-module reporting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    /// Number of recipes (examples and tests) the module owns.
    pub recipe_count: usize,
    /// Module opted out of coverage requirements.
    pub sloppy_coverage: bool,
}

/// Every recipe and module of a repository.
#[derive(Debug, Default)]
pub struct RecipeSet {
    recipes: BTreeMap<String, Recipe>,
    modules: Vec<ModuleInfo>,
}

impl RecipeSet {
    pub fn new() -> Self {
        RecipeSet::default()
    }

    /// Add a recipe, returning any recipe it replaced.
    pub fn add_recipe(&mut self, recipe: Recipe) -> Option<Recipe> {
        self.recipes.insert(recipe.name.clone(), recipe)
    }

    pub fn add_module(&mut self, module: ModuleInfo) {
        self.modules.push(module);
    }

    /// Recipes in name order.
    pub fn recipes(&self) -> impl Iterator<Item = &Recipe> + '_ {
        self.recipes.values()
    }

    pub fn modules(&self) -> &[ModuleInfo] {
        &self.modules
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    /// Modules that own no recipes and did not opt out of coverage.
    pub fn uncovered_modules(&self) -> BTreeSet<String> {
        self.modules
            .iter()
            .filter(|m| m.recipe_count == 0 && !m.sloppy_coverage)
            .map(|m| m.name.clone())
            .collect()
    }
}
