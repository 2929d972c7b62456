use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::detect::has_project_marker;
use crate::paths::normalize_path;

pub const DEFAULT_SCAN_DEPTH: usize = 3;

/// Directories that never hold projects worth registering
const SKIP_DIRECTORIES: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    ".env",
    "env",
    ".tox",
    ".nox",
    ".pytest_cache",
    ".mypy_cache",
    ".ruff_cache",
    "dist",
    "build",
    ".next",
    ".nuxt",
    "coverage",
    ".coverage",
    "vendor",
    "target",
    "pkg",
    "bin",
];

/// A directory is a project root if it is a git checkout or carries a type marker.
pub fn is_project_directory(path: &Path) -> bool {
    path.is_dir() && (path.join(".git").is_dir() || has_project_marker(path))
}

fn is_scannable(entry: &DirEntry, include_hidden: bool) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    if !include_hidden && name.starts_with('.') {
        return false;
    }
    !SKIP_DIRECTORIES.contains(&name.as_ref())
}

/// Find project roots under `root`, at most `max_depth` levels down.
///
/// Found projects are not descended into. If `root` is itself a project it is
/// the only result.
pub fn scan_directory(root: impl AsRef<Path>, max_depth: usize, include_hidden: bool) -> Vec<PathBuf> {
    let root = normalize_path(root);
    if is_project_directory(&root) {
        return vec![root];
    }

    let mut found = Vec::new();
    let mut walker = WalkDir::new(&root)
        .min_depth(1)
        .max_depth(max_depth)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || is_scannable(entry, include_hidden));

    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("skipping unreadable entry: {e}");
                continue;
            }
        };
        if is_project_directory(entry.path()) {
            found.push(entry.into_path());
            walker.skip_current_dir();
        }
    }

    found.sort();
    found
}
