//! Layout documents: the tmuxp-compatible YAML that describes a session's
//! windows and panes, and the generators that produce them.
//!
//! Rendering is pure and deterministic, so regenerating a config from the
//! same inputs always produces the same bytes.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::detect::ProjectType;
use crate::paths::{KataPaths, PROJECT_CONFIG_FILE};
use crate::project::Project;
use crate::registry::Registry;
use crate::store;

const EDITOR_COMMAND: &str = "$EDITOR .";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to access {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid layout document {path}: {source}")]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// Window/pane presets offered when creating a config
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LayoutPreset {
    /// Single editor window
    Minimal,
    /// Editor, shell and tests
    Standard,
    /// Editor (split), shell, tests, build and logs
    Full,
    /// Starts as minimal, meant to be hand-edited
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutDocument {
    pub session_name: String,
    pub start_directory: String,
    #[serde(default)]
    pub windows: Vec<Window>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub window_name: String,
    /// tmux layout name (`main-vertical`) or a captured layout string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<String>,
    #[serde(default)]
    pub panes: Vec<Pane>,
}

/// A pane; an empty command list means "just the default shell"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawPane")]
pub struct Pane {
    pub shell_command: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_directory: Option<String>,
}

/// tmuxp accepts several pane shorthands in hand-edited files
#[derive(Deserialize)]
#[serde(untagged)]
enum RawPane {
    Empty(()),
    Command(String),
    Commands(Vec<String>),
    Full {
        #[serde(default)]
        shell_command: Option<RawCommands>,
        #[serde(default)]
        start_directory: Option<String>,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCommands {
    One(String),
    Many(Vec<String>),
}

impl From<RawCommands> for Vec<String> {
    fn from(raw: RawCommands) -> Self {
        match raw {
            RawCommands::One(cmd) => vec![cmd],
            RawCommands::Many(cmds) => cmds,
        }
    }
}

impl From<RawPane> for Pane {
    fn from(raw: RawPane) -> Self {
        match raw {
            RawPane::Empty(()) => Pane::default(),
            RawPane::Command(cmd) => Pane::new([cmd]),
            RawPane::Commands(cmds) => Pane::new(cmds),
            RawPane::Full {
                shell_command,
                start_directory,
            } => Pane {
                shell_command: shell_command.map(Into::into).unwrap_or_default(),
                start_directory,
            },
        }
    }
}

impl Pane {
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            shell_command: commands.into_iter().map(Into::into).collect(),
            start_directory: None,
        }
    }

    fn shell() -> Self {
        Self::default()
    }

    fn from_lines(lines: &[&str]) -> Self {
        Self::new(lines.iter().copied())
    }
}

impl Window {
    pub fn new(name: impl Into<String>, panes: Vec<Pane>) -> Self {
        Self {
            window_name: name.into(),
            layout: None,
            panes,
        }
    }

    fn with_layout(mut self, layout: &str) -> Self {
        self.layout = Some(layout.to_string());
        self
    }
}

impl LayoutDocument {
    /// Empty skeleton carrying the session naming conventions
    pub fn skeleton(session_name: impl Into<String>, start_directory: impl AsRef<Path>) -> Self {
        Self {
            session_name: session_name.into(),
            start_directory: start_directory.as_ref().to_string_lossy().to_string(),
            windows: Vec::new(),
        }
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

fn editor_window() -> Window {
    Window::new("editor", vec![Pane::new([EDITOR_COMMAND])])
}

/// `env` followed by `cmds`, the way test/build panes are seeded
fn with_env(ty: ProjectType, cmds: &[&str]) -> Pane {
    let lines: Vec<&str> = ty.env_activation().iter().chain(cmds).copied().collect();
    Pane::from_lines(&lines)
}

fn legacy_windows(ty: ProjectType) -> Vec<Window> {
    match ty {
        ProjectType::Python => {
            let activate = ProjectType::Python.env_activation();
            vec![
                editor_window(),
                Window::new("shell", vec![Pane::from_lines(activate)]),
                Window::new(
                    "tests",
                    vec![Pane::from_lines(&["# Run tests with pytest", activate[1]])],
                ),
            ]
        }
        ProjectType::Node => vec![
            editor_window(),
            Window::new(
                "dev",
                vec![Pane::from_lines(&["# Start dev server", "# npm run dev"])],
            ),
            Window::new("tests", vec![Pane::from_lines(ty.test_command())]),
        ],
        ProjectType::Go => vec![
            editor_window(),
            Window::new("shell", vec![Pane::shell()]),
            Window::new("tests", vec![Pane::from_lines(ty.test_command())]),
        ],
        ProjectType::Generic => vec![Window::new("main", vec![Pane::new([EDITOR_COMMAND])])],
    }
}

fn minimal_windows(_ty: ProjectType) -> Vec<Window> {
    vec![editor_window()]
}

fn standard_windows(ty: ProjectType) -> Vec<Window> {
    vec![
        editor_window(),
        Window::new("shell", vec![Pane::from_lines(ty.env_activation())]),
        Window::new("tests", vec![with_env(ty, ty.test_command())]),
    ]
}

fn full_windows(ty: ProjectType) -> Vec<Window> {
    vec![
        Window::new(
            "editor",
            vec![Pane::new([EDITOR_COMMAND]), Pane::new(["git status"])],
        )
        .with_layout("main-vertical"),
        Window::new("shell", vec![Pane::from_lines(ty.env_activation())]),
        Window::new("tests", vec![with_env(ty, ty.test_command())]),
        Window::new("build", vec![with_env(ty, ty.build_command())]),
        Window::new(
            "logs",
            vec![
                Pane::new(["# Application logs"]),
                Pane::new(["# System logs"]),
            ],
        )
        .with_layout("even-vertical"),
    ]
}

fn preset_windows(preset: LayoutPreset, ty: ProjectType) -> Vec<Window> {
    match preset {
        LayoutPreset::Minimal | LayoutPreset::Custom => minimal_windows(ty),
        LayoutPreset::Standard => standard_windows(ty),
        LayoutPreset::Full => full_windows(ty),
    }
}

/// Render the layout for a project.
///
/// Without a preset the per-type window set is used; with one, the preset
/// decides the windows and the project type only seeds pane commands.
pub fn render_template(
    project: &Project,
    ty: ProjectType,
    preset: Option<LayoutPreset>,
) -> LayoutDocument {
    let mut doc = LayoutDocument::skeleton(&project.name, &project.path);
    doc.windows = match preset {
        None => legacy_windows(ty),
        Some(preset) => preset_windows(preset, ty),
    };
    doc
}

/// In-memory layout for a directory that is not a registered project
pub fn generate_adhoc_config(
    session_name: &str,
    directory: impl AsRef<Path>,
    ty: ProjectType,
) -> LayoutDocument {
    let mut doc = LayoutDocument::skeleton(session_name, directory);
    doc.windows = standard_windows(ty);
    doc
}

pub fn template_path(project: &Project) -> PathBuf {
    project.path.join(PROJECT_CONFIG_FILE)
}

pub fn template_exists(project: &Project) -> bool {
    template_path(project).is_file()
}

/// Serialize `doc` over `path`, creating parent directories as needed.
pub fn write_document(path: &Path, doc: &LayoutDocument) -> Result<(), TemplateError> {
    let yaml = doc.to_yaml().map_err(|source| TemplateError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    store::write_atomic(path, yaml.as_bytes()).map_err(|source| TemplateError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Render and write the project's config, overwriting any existing file.
pub fn write_template(
    project: &Project,
    ty: ProjectType,
    preset: Option<LayoutPreset>,
) -> Result<PathBuf, TemplateError> {
    let path = template_path(project);
    write_document(&path, &render_template(project, ty, preset))?;
    Ok(path)
}

pub fn read_document(path: &Path) -> Result<LayoutDocument, TemplateError> {
    let raw = fs::read_to_string(path).map_err(|source| TemplateError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&raw).map_err(|source| TemplateError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_template(project: &Project) -> Result<LayoutDocument, TemplateError> {
    read_document(&template_path(project))
}

/// Rewrite the config's `session_name` to the project's name, leaving every
/// other key as written. Returns whether the file changed.
pub fn sync_session_name(project: &Project) -> Result<bool, TemplateError> {
    let path = template_path(project);
    if !path.is_file() {
        return Ok(false);
    }
    let io_err = |source: io::Error| TemplateError::Io {
        path: path.clone(),
        source,
    };
    let yaml_err = |source: serde_yaml::Error| TemplateError::Yaml {
        path: path.clone(),
        source,
    };

    let raw = fs::read_to_string(&path).map_err(io_err)?;
    let mut doc: serde_yaml::Value = serde_yaml::from_str(&raw).map_err(yaml_err)?;
    let Some(map) = doc.as_mapping_mut() else {
        return Ok(false);
    };
    let key = serde_yaml::Value::from("session_name");
    if map.get(&key).and_then(serde_yaml::Value::as_str) == Some(project.name.as_str()) {
        return Ok(false);
    }
    map.insert(key, serde_yaml::Value::from(project.name.as_str()));

    let yaml = serde_yaml::to_string(&doc).map_err(yaml_err)?;
    store::write_atomic(&path, yaml.as_bytes()).map_err(io_err)?;
    Ok(true)
}

/// Keep an existing config (renamed to the project) or render a new one.
pub fn ensure_template(
    project: &Project,
    ty: ProjectType,
    preset: Option<LayoutPreset>,
) -> Result<PathBuf, TemplateError> {
    if template_exists(project) {
        sync_session_name(project)?;
        Ok(template_path(project))
    } else {
        write_template(project, ty, preset)
    }
}

/// Move a config from the old central `configs/` directory into the
/// project directory. Returns whether a file was moved.
pub fn migrate_legacy_config(paths: &KataPaths, project: &Project) -> Result<bool, TemplateError> {
    let legacy = paths.legacy_configs_dir().join(&project.config);
    let target = template_path(project);
    if target.exists() || !legacy.is_file() {
        return Ok(false);
    }

    let io_err = |source: io::Error| TemplateError::Io {
        path: legacy.clone(),
        source,
    };
    if fs::rename(&legacy, &target).is_err() {
        // Likely a cross-device move
        fs::copy(&legacy, &target).map_err(io_err)?;
        fs::remove_file(&legacy).map_err(io_err)?;
    }
    tracing::debug!("migrated {} -> {}", legacy.display(), target.display());
    Ok(true)
}

/// Migrate every registered project, reporting `(name, moved)` per project.
pub fn migrate_all_configs(paths: &KataPaths, registry: &Registry) -> Vec<(String, bool)> {
    registry
        .list_all()
        .into_iter()
        .map(|project| {
            let moved = migrate_legacy_config(paths, project).unwrap_or_else(|e| {
                tracing::warn!("could not migrate config for {}: {e}", project.name);
                false
            });
            (project.name.clone(), moved)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::DEFAULT_GROUP;

    fn project() -> Project {
        Project::new("demo", "/tmp/kata-test/demo", DEFAULT_GROUP)
    }

    fn window_names(doc: &LayoutDocument) -> Vec<&str> {
        doc.windows.iter().map(|w| w.window_name.as_str()).collect()
    }

    #[test]
    fn test_legacy_templates_per_type() {
        let p = project();
        assert_eq!(
            window_names(&render_template(&p, ProjectType::Python, None)),
            vec!["editor", "shell", "tests"]
        );
        assert_eq!(
            window_names(&render_template(&p, ProjectType::Node, None)),
            vec!["editor", "dev", "tests"]
        );
        assert_eq!(
            window_names(&render_template(&p, ProjectType::Go, None)),
            vec!["editor", "shell", "tests"]
        );
        let generic = render_template(&p, ProjectType::Generic, None);
        assert_eq!(window_names(&generic), vec!["main"]);
        assert_eq!(generic.windows[0].panes[0].shell_command, vec!["$EDITOR ."]);

        let go = render_template(&p, ProjectType::Go, None);
        assert!(go.windows[1].panes[0].shell_command.is_empty());
    }

    #[test]
    fn test_skeleton_uses_project_identity() {
        let doc = render_template(&project(), ProjectType::Generic, None);
        assert_eq!(doc.session_name, "demo");
        assert_eq!(doc.start_directory, "/tmp/kata-test/demo");
    }

    #[test]
    fn test_presets() {
        let p = project();
        let minimal = render_template(&p, ProjectType::Python, Some(LayoutPreset::Minimal));
        let custom = render_template(&p, ProjectType::Python, Some(LayoutPreset::Custom));
        assert_eq!(window_names(&minimal), vec!["editor"]);
        assert_eq!(minimal, custom);

        let full = render_template(&p, ProjectType::Node, Some(LayoutPreset::Full));
        assert_eq!(
            window_names(&full),
            vec!["editor", "shell", "tests", "build", "logs"]
        );
        assert_eq!(full.windows[0].layout.as_deref(), Some("main-vertical"));
        assert_eq!(full.windows[0].panes.len(), 2);
        assert_eq!(
            full.windows[3].panes[0].shell_command,
            vec!["# Build/watch", "# npm run build"]
        );
    }

    #[test]
    fn test_python_env_is_injected_into_test_pane() {
        let doc = render_template(&project(), ProjectType::Python, Some(LayoutPreset::Standard));
        let tests = &doc.windows[2].panes[0].shell_command;
        assert_eq!(tests[1], "[ -f .venv/bin/activate ] && source .venv/bin/activate");
        assert_eq!(tests.last().map(String::as_str), Some("# pytest"));

        let node = render_template(&project(), ProjectType::Node, Some(LayoutPreset::Standard));
        assert_eq!(
            node.windows[2].panes[0].shell_command,
            vec!["# Run tests", "# npm test"]
        );
        assert!(node.windows[1].panes[0].shell_command.is_empty());
    }

    #[test]
    fn test_rendering_is_byte_identical() {
        let p = project();
        for preset in [None, Some(LayoutPreset::Full), Some(LayoutPreset::Standard)] {
            let a = render_template(&p, ProjectType::Python, preset).to_yaml().unwrap();
            let b = render_template(&p, ProjectType::Python, preset).to_yaml().unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_adhoc_uses_standard_windows() {
        let doc = generate_adhoc_config("scratch-1", "/tmp/scratch", ProjectType::Go);
        assert_eq!(doc.session_name, "scratch-1");
        assert_eq!(doc.start_directory, "/tmp/scratch");
        assert_eq!(window_names(&doc), vec!["editor", "shell", "tests"]);
    }

    #[test]
    fn test_write_and_read_template() {
        let dir = tempfile::tempdir().unwrap();
        let p = Project::from_path(dir.path(), DEFAULT_GROUP);
        assert!(!template_exists(&p));

        let path = write_template(&p, ProjectType::Node, None).unwrap();
        assert_eq!(path, dir.path().canonicalize().unwrap().join(".kata.yaml"));
        assert!(template_exists(&p));

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("session_name:"));
        assert!(!raw.contains("layout:"));

        let doc = read_template(&p).unwrap();
        assert_eq!(doc, render_template(&p, ProjectType::Node, None));
    }

    #[test]
    fn test_sync_session_name_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let p = Project::new("alpha", dir.path(), DEFAULT_GROUP);
        assert!(!sync_session_name(&p).unwrap());

        let path = template_path(&p);
        fs::write(
            &path,
            "session_name: api\nstart_directory: .\nshell_command_before: source .env\nwindows: []\n",
        )
        .unwrap();

        assert!(sync_session_name(&p).unwrap());
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("session_name: alpha"));
        assert!(raw.contains("shell_command_before: source .env"));
        assert!(!sync_session_name(&p).unwrap());
    }

    #[test]
    fn test_ensure_template_renames_kept_config() {
        let dir = tempfile::tempdir().unwrap();
        let p = Project::new("web", dir.path(), DEFAULT_GROUP);
        let path = ensure_template(&p, ProjectType::Generic, None).unwrap();
        assert_eq!(read_template(&p).unwrap().session_name, "web");

        let renamed = Project::new("frontend", dir.path(), DEFAULT_GROUP);
        assert_eq!(ensure_template(&renamed, ProjectType::Node, Some(LayoutPreset::Full)).unwrap(), path);
        let doc = read_template(&renamed).unwrap();
        assert_eq!(doc.session_name, "frontend");
        assert_eq!(doc.windows, render_template(&p, ProjectType::Generic, None).windows);
    }

    #[test]
    fn test_reads_tmuxp_pane_shorthands() {
        let raw = r#"
session_name: hand
start_directory: /tmp/hand
windows:
  - window_name: one
    panes:
      - vim
      -
      - shell_command: htop
      - shell_command:
          - cd src
          - ls
        start_directory: /tmp/hand/src
"#;
        let doc: LayoutDocument = serde_yaml::from_str(raw).unwrap();
        let panes = &doc.windows[0].panes;
        assert_eq!(panes[0].shell_command, vec!["vim"]);
        assert!(panes[1].shell_command.is_empty());
        assert_eq!(panes[2].shell_command, vec!["htop"]);
        assert_eq!(panes[3].shell_command, vec!["cd src", "ls"]);
        assert_eq!(panes[3].start_directory.as_deref(), Some("/tmp/hand/src"));
    }

    #[test]
    fn test_migrate_legacy_config() {
        let config_root = tempfile::tempdir().unwrap();
        let project_dir = tempfile::tempdir().unwrap();
        let paths = KataPaths::new(config_root.path());
        let p = Project::from_path(project_dir.path(), DEFAULT_GROUP);

        assert!(!migrate_legacy_config(&paths, &p).unwrap());

        fs::create_dir_all(paths.legacy_configs_dir()).unwrap();
        let legacy = paths.legacy_configs_dir().join(&p.config);
        fs::write(&legacy, "session_name: x\nstart_directory: /x\n").unwrap();

        assert!(migrate_legacy_config(&paths, &p).unwrap());
        assert!(!legacy.exists());
        assert!(template_exists(&p));
        // Second run is a no-op
        assert!(!migrate_legacy_config(&paths, &p).unwrap());
    }
}
