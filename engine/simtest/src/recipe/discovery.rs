//! Recipe file discovery.
//!
//! Finds all recipe files with a given extension in a directory tree.
//! Convention: a recipe's name is its path relative to the search root,
//! without extension, using `/` separators.

use std::fs;
use std::path::{Path, PathBuf};

/// A discovered recipe file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecipeFile {
    /// Recipe name relative to the search root.
    pub name: String,
    /// Path to the recipe file.
    pub path: PathBuf,
}

/// Discover all recipe files under `root` with the given extension.
///
/// # Returns
/// Discovered recipes, sorted by name. A missing root yields nothing.
pub fn discover_recipes(root: &Path, extension: &str) -> Vec<RecipeFile> {
    let mut files = Vec::new();
    discover_recursive(root, root, extension, &mut files);
    files.sort_by(|a, b| a.name.cmp(&b.name));
    files
}

fn discover_recursive(root: &Path, dir: &Path, extension: &str, files: &mut Vec<RecipeFile>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        // Skip hidden files and directories
        if file_name.starts_with('.') {
            continue;
        }

        if path.is_dir() {
            // Expectation directories sit next to their recipes
            if file_name.ends_with(".expected")
                || matches!(file_name, "target" | "node_modules" | "__pycache__")
            {
                continue;
            }
            discover_recursive(root, &path, extension, files);
        } else if path.extension().is_some_and(|e| e == extension) {
            if let Some(name) = recipe_name(root, &path) {
                files.push(RecipeFile { name, path });
            }
        }
    }
}

/// `root/sub/name.ext` becomes `sub/name`.
fn recipe_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?.with_extension("");
    let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
    Some(parts?.join("/"))
}
