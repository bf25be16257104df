//! Test case enumeration and expectation file reconciliation.
//!
//! The enumerator is the only writer of the description channel and the only
//! party that touches expectation files. For every selected recipe it runs
//! the test generator, claims one expectation path per test case, emits a
//! [`Description`] per test that passes the filter, and compares the claimed
//! paths with what is on disk.
//!
//! A recipe's descriptions are only emitted once its generator has finished
//! cleanly, so a generator failure or a claim conflict leaves nothing of that
//! recipe in the channel. Full names (`recipe.test`) must be unique across
//! the run: recipe `a` with test `b.c` and recipe `a.b` with test `c` are
//! rejected rather than merged into one result.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};
use sim_channel::Channel;
use sim_outcome::{Description, Outcome};

use crate::filter::TestFilter;
use crate::recipe::{GenError, Recipe, RecipeSet};
use crate::{Mode, RunError};

/// What enumeration leaves behind for the rest of the run.
#[derive(Debug, Default)]
pub struct Enumeration {
    /// Expectation files no test case claims. Always empty after TRAIN,
    /// which deletes them.
    pub unused_expectation_files: BTreeSet<PathBuf>,
    /// Claimed expectation path of every emitted test.
    expectations: FxHashMap<Description, PathBuf>,
}

impl Enumeration {
    /// Number of test cases emitted.
    pub fn emitted(&self) -> usize {
        self.expectations.len()
    }

    /// Write the regenerated expectation payloads found in `outcome` to their
    /// claimed paths. Files whose content is already current are left alone.
    ///
    /// Returns the number of files written.
    pub fn write_expectations(&self, outcome: &Outcome) -> Result<usize, RunError> {
        let mut written = 0;
        for (desc, path) in &self.expectations {
            let Some(payload) = outcome
                .results
                .get(&desc.full_name())
                .and_then(|result| result.expectation.as_deref())
            else {
                continue;
            };

            match fs::read_to_string(path) {
                Ok(current) if current == payload => continue,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(RunError::Reconcile {
                        action: "read",
                        path: path.clone(),
                        source,
                    })
                }
            }
            fs::write(path, payload).map_err(|source| RunError::Reconcile {
                action: "write",
                path: path.clone(),
                source,
            })?;
            tracing::trace!(path = %path.display(), "expectation written");
            written += 1;
        }
        Ok(written)
    }
}

/// Enumerate every selected test case of `recipes` onto `descs`.
///
/// Releases the channel's single writer slot once every recipe is done. On
/// error the slot is not released; the caller crashes the channel instead.
pub fn enumerate(
    recipes: &RecipeSet,
    filter: &TestFilter,
    mode: Mode,
    descs: &Channel<Description>,
) -> Result<Enumeration, RunError> {
    let mut enumeration = Enumeration::default();
    // Results are keyed by full name, and dots are legal on both sides of it.
    let mut full_names: FxHashMap<String, Description> = FxHashMap::default();

    for recipe in recipes.recipes() {
        if !filter.matches_recipe(recipe.name()) {
            continue;
        }
        let _span = tracing::debug_span!("enumerate", recipe = recipe.name()).entered();

        if mode.is_train() {
            let dir = recipe.expectation_dir();
            fs::create_dir_all(dir).map_err(|source| RunError::ExpectationDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let claims = claim_tests(recipe, filter)?;
        for (desc, _) in &claims.selected {
            if let Some(other) = full_names.get(&desc.full_name()) {
                return Err(RunError::AmbiguousTestName {
                    name: desc.full_name(),
                    recipe: desc.recipe_name.clone(),
                    test: desc.test_name.clone(),
                    other_recipe: other.recipe_name.clone(),
                    other_test: other.test_name.clone(),
                });
            }
        }
        for (desc, path) in claims.selected {
            tracing::trace!(test = %desc, "description emitted");
            full_names.insert(desc.full_name(), desc.clone());
            enumeration.expectations.insert(desc.clone(), path);
            descs.put(desc)?;
        }

        let on_disk = recipe
            .expectation_paths()
            .map_err(|source| RunError::ExpectationScan {
                path: recipe.expectation_dir().to_path_buf(),
                source,
            })?;
        enumeration.unused_expectation_files.extend(
            on_disk
                .into_iter()
                .filter(|path| !claims.paths.contains_key(path)),
        );
    }

    descs.dec_writer();
    tracing::debug!(
        emitted = enumeration.emitted(),
        stale = enumeration.unused_expectation_files.len(),
        "enumeration finished"
    );

    if mode.is_train() {
        for path in std::mem::take(&mut enumeration.unused_expectation_files) {
            remove_stale(&path)?;
        }
    }
    Ok(enumeration)
}

/// Test cases of one recipe, after a clean generator run.
struct Claims {
    /// Tests that passed the filter, with their expectation paths.
    selected: Vec<(Description, PathBuf)>,
    /// Every claimed expectation path, with the test that claimed it.
    paths: FxHashMap<PathBuf, String>,
}

fn claim_tests(recipe: &Recipe, filter: &TestFilter) -> Result<Claims, RunError> {
    let mut claims = Claims {
        selected: Vec::new(),
        paths: FxHashMap::default(),
    };
    let mut names = FxHashSet::default();

    let cases = recipe
        .gen_tests()
        .map_err(|e| generator_error(recipe, e))?;
    for case in cases {
        let case = case.map_err(|e| generator_error(recipe, e))?;

        if !names.insert(case.name.clone()) {
            return Err(RunError::DuplicateTestName {
                recipe: recipe.name().to_string(),
                test: case.name,
            });
        }
        if let Some(other) = claims.paths.get(&case.expect_file) {
            return Err(RunError::ExpectationCollision {
                recipe: recipe.name().to_string(),
                test: case.name,
                other: other.clone(),
                path: case.expect_file,
            });
        }
        claims
            .paths
            .insert(case.expect_file.clone(), case.name.clone());

        if filter.matches_test(recipe.name(), &case.name) {
            claims
                .selected
                .push((Description::new(recipe.name(), case.name), case.expect_file));
        }
    }
    Ok(claims)
}

fn generator_error(recipe: &Recipe, source: GenError) -> RunError {
    let recipe_name = recipe.name().to_string();
    match source {
        GenError::Cancelled => RunError::Cancelled {
            recipe: recipe_name,
        },
        source => {
            tracing::error!(recipe = %recipe_name, error = %source, "test generator failed");
            RunError::Generator {
                recipe: recipe_name,
                source,
            }
        }
    }
}

fn remove_stale(path: &Path) -> Result<(), RunError> {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "removed stale expectation");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(RunError::Reconcile {
            action: "remove",
            path: path.to_path_buf(),
            source,
        }),
    }
}
