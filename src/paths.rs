use anyhow::{anyhow, Result};
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the per-project layout file, kept inside the project directory
pub const PROJECT_CONFIG_FILE: &str = ".kata.yaml";

#[derive(Debug, Error)]
pub enum PathError {
    #[error("Path does not exist: {0}")]
    NotFound(PathBuf),
    #[error("Path is not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Locations of every file kata persists
#[derive(Debug, Clone)]
pub struct KataPaths {
    root: PathBuf,
}

impl KataPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$KATA_CONFIG_DIR` if set, otherwise `~/.config/kata`
    pub fn from_env() -> Result<Self> {
        if let Some(dir) = env::var_os("KATA_CONFIG_DIR").filter(|v| !v.is_empty()) {
            return Ok(Self::new(dir));
        }
        let home =
            dirs::home_dir().ok_or_else(|| anyhow!("failed to resolve home directory"))?;
        Ok(Self::new(home.join(".config").join("kata")))
    }

    #[cfg(test)]
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn registry_file(&self) -> PathBuf {
        self.root.join("registry.json")
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join("settings.json")
    }

    /// Pre-settings file that only carried the return-loop flag
    pub fn legacy_loop_file(&self) -> PathBuf {
        self.root.join("loop_config.json")
    }

    pub fn routine_file(&self) -> PathBuf {
        self.root.join("routine.json")
    }

    /// Where layout files lived before they moved into project directories
    pub fn legacy_configs_dir(&self) -> PathBuf {
        self.root.join("configs")
    }
}

fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

/// Resolve a path to its absolute form, following symlinks when it exists.
pub fn normalize_path(path: impl AsRef<Path>) -> PathBuf {
    let expanded = expand_home(path.as_ref());
    expanded
        .canonicalize()
        .or_else(|_| std::path::absolute(&expanded))
        .unwrap_or(expanded)
}

/// Validate that a path exists and is a directory, returning it resolved.
pub fn validate_project_path(path: impl AsRef<Path>) -> Result<PathBuf, PathError> {
    let resolved = normalize_path(path);
    if !resolved.exists() {
        return Err(PathError::NotFound(resolved));
    }
    if !resolved.is_dir() {
        return Err(PathError::NotADirectory(resolved));
    }
    Ok(resolved)
}

/// Derive a tmux-safe session name from a directory basename.
///
/// tmux rejects `.` and `:` in session names and substitutes `_` itself,
/// so we do the same up front to keep the registry and tmux in agreement.
pub fn session_name_from_path(path: impl AsRef<Path>) -> String {
    let resolved = normalize_path(path);
    let base = resolved
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "root".to_string());
    sanitize_session_name(&base)
}

pub fn sanitize_session_name(name: &str) -> String {
    name.chars()
        .map(|c| if c == '.' || c == ':' { '_' } else { c })
        .collect()
}

pub fn is_valid_session_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['.', ':'])
}

/// Locate an executable on `PATH`
pub fn find_in_path(bin: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(bin))
        .find(|candidate| candidate.is_file())
}
