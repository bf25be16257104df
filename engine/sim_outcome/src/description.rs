//! Test case descriptions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies exactly one test case.
///
/// The pair (`recipe_name`, `test_name`) is unique within a run.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Description {
    pub recipe_name: String,
    pub test_name: String,
}

impl Description {
    pub fn new(recipe_name: impl Into<String>, test_name: impl Into<String>) -> Self {
        Description {
            recipe_name: recipe_name.into(),
            test_name: test_name.into(),
        }
    }

    /// The `recipe.test` name used as the result key and matched by filters.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.recipe_name, self.test_name)
    }
}

impl fmt::Display for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.recipe_name, self.test_name)
    }
}
