use std::fmt;
use std::path::Path;

use crate::paths::normalize_path;

/// Project type, inferred from marker files in the project root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectType {
    Python,
    Node,
    Go,
    Generic,
}

/// Detection order; the first type with a marker present wins
pub const DETECTION_ORDER: [ProjectType; 3] =
    [ProjectType::Python, ProjectType::Node, ProjectType::Go];

impl ProjectType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Node => "node",
            Self::Go => "go",
            Self::Generic => "generic",
        }
    }

    pub fn markers(self) -> &'static [&'static str] {
        match self {
            Self::Python => &["pyproject.toml", "setup.py", "requirements.txt", "Pipfile"],
            Self::Node => &["package.json"],
            Self::Go => &["go.mod"],
            Self::Generic => &[],
        }
    }

    /// Shell lines that activate the project environment
    pub fn env_activation(self) -> &'static [&'static str] {
        match self {
            Self::Python => &[
                "# Activate virtualenv if present",
                "[ -f .venv/bin/activate ] && source .venv/bin/activate",
            ],
            Self::Node | Self::Go | Self::Generic => &[],
        }
    }

    pub fn test_command(self) -> &'static [&'static str] {
        match self {
            Self::Python => &["# Run tests with pytest", "# pytest"],
            Self::Node => &["# Run tests", "# npm test"],
            Self::Go => &["# Run tests", "# go test ./..."],
            Self::Generic => &["# Run tests"],
        }
    }

    pub fn build_command(self) -> &'static [&'static str] {
        match self {
            Self::Python => &["# Build/watch", "# pip install -e ."],
            Self::Node => &["# Build/watch", "# npm run build"],
            Self::Go => &["# Build", "# go build ./..."],
            Self::Generic => &["# Build"],
        }
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detect the project type of a directory. Anything that is not a
/// directory, or has no known marker, is `Generic`.
pub fn detect_project_type(path: impl AsRef<Path>) -> ProjectType {
    let root = normalize_path(path);
    if !root.is_dir() {
        return ProjectType::Generic;
    }

    DETECTION_ORDER
        .into_iter()
        .find(|ty| ty.markers().iter().any(|m| root.join(m).exists()))
        .unwrap_or(ProjectType::Generic)
}

/// Whether a directory carries any project marker
pub fn has_project_marker(path: &Path) -> bool {
    DETECTION_ORDER
        .iter()
        .flat_map(|ty| ty.markers())
        .any(|m| path.join(m).exists())
}
