//! Test name filters.
//!
//! A filter is a glob of the form `recipe` or `recipe.test`. It compiles
//! into two matchers: a coarse one over recipe names, built from the part
//! before the first `.`, and a fine one over full `recipe.test` names. A
//! filter without a `.` selects every test of the recipes it matches.

use glob::Pattern;

use crate::RunError;

/// Compiled filter list. Any single pattern matching is enough.
#[derive(Clone, Debug, Default)]
pub struct TestFilter {
    recipes: Vec<Pattern>,
    tests: Vec<Pattern>,
}

impl TestFilter {
    /// Compile `patterns`. An empty list matches everything.
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Self, RunError> {
        let mut filter = TestFilter::default();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let compile = |glob: &str| {
                Pattern::new(glob).map_err(|source| RunError::Filter {
                    pattern: pattern.to_string(),
                    source,
                })
            };
            match pattern.split_once('.') {
                Some((recipe, _)) => {
                    filter.recipes.push(compile(recipe)?);
                    filter.tests.push(compile(pattern)?);
                }
                None => {
                    filter.recipes.push(compile(pattern)?);
                    filter.tests.push(compile(&format!("{pattern}.*"))?);
                }
            }
        }
        Ok(filter)
    }

    /// Returns true if no patterns were given.
    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    /// Coarse check: could any test of `recipe` be selected?
    pub fn matches_recipe(&self, recipe: &str) -> bool {
        self.is_empty() || self.recipes.iter().any(|p| p.matches(recipe))
    }

    /// Fine check on the full `recipe.test` name.
    pub fn matches_test(&self, recipe: &str, test: &str) -> bool {
        if self.is_empty() {
            return true;
        }
        let full_name = format!("{recipe}.{test}");
        self.tests.iter().any(|p| p.matches(&full_name))
    }
}
