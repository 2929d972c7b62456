//! Session lifecycle on top of tmux and tmuxp.
//!
//! A session's state is never stored; it is observed from tmux on demand:
//! `Idle -> launch -> Detached -> attach -> Active -> detach -> Detached -> kill -> Idle`.

use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::detect::detect_project_type;
use crate::paths::{self, KataPaths, PathError};
use crate::project::Project;
use crate::template::{self, LayoutDocument, Pane, TemplateError, Window};
use crate::tmux::{
    resolve_pane_command, CommandRunner, SessionStatus, SystemRunner, TmuxClient, TmuxError,
};

const LOADER: &str = "tmuxp";
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);
const READY_POLL_ATTEMPTS: u32 = 20;
/// `base` plus `base-1` .. `base-99` before falling back to a timestamp
const ADHOC_NAME_ATTEMPTS: usize = 100;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Config not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Failed to launch session: {0}")]
    LaunchFailed(String),
    #[error("Failed to attach to {name}: {reason}")]
    AttachFailed { name: String, reason: String },
    #[error("Failed to kill {name}: {reason}")]
    KillFailed { name: String, reason: String },
    #[error("Session {name} did not become ready within {waited:?}")]
    StartTimeout { name: String, waited: Duration },
    #[error("tmuxp not found on PATH (install it with `pipx install tmuxp`)")]
    LoaderMissing,
    #[error("Failed to capture layout of {name}: {reason}")]
    CaptureFailed { name: String, reason: String },
    #[error(transparent)]
    InvalidDirectory(#[from] PathError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub struct SessionManager<R = SystemRunner> {
    tmux: TmuxClient<R>,
    paths: KataPaths,
    inside_tmux: bool,
    poll_interval: Duration,
    poll_attempts: u32,
}

impl<R: CommandRunner> SessionManager<R> {
    pub fn new(runner: R, paths: KataPaths) -> Self {
        let inside_tmux = std::env::var_os("TMUX").is_some_and(|v| !v.is_empty());
        Self {
            tmux: TmuxClient::new(runner),
            paths,
            inside_tmux,
            poll_interval: READY_POLL_INTERVAL,
            poll_attempts: READY_POLL_ATTEMPTS,
        }
    }

    pub fn with_inside_tmux(mut self, inside: bool) -> Self {
        self.inside_tmux = inside;
        self
    }

    pub fn with_ready_poll(mut self, interval: Duration, attempts: u32) -> Self {
        self.poll_interval = interval;
        self.poll_attempts = attempts;
        self
    }

    pub fn runner(&self) -> &R {
        self.tmux.runner()
    }

    pub fn is_inside_tmux(&self) -> bool {
        self.inside_tmux
    }

    pub async fn client_tty(&self) -> Option<String> {
        self.tmux.client_tty().await
    }

    pub async fn session_exists(&self, name: &str) -> bool {
        self.tmux.has_session(name).await
    }

    pub async fn get_session_status(&self, name: &str) -> SessionStatus {
        self.tmux.session_status(name).await
    }

    /// One tmux query for every session. Names missing from the map are idle.
    pub async fn get_all_session_statuses(&self) -> HashMap<String, SessionStatus> {
        self.tmux.session_statuses().await
    }

    pub async fn list_session_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.get_all_session_statuses().await.into_keys().collect();
        names.sort();
        names
    }

    /// Start the project's session detached. Does not wait for it to appear.
    /// The session is named after the project whatever the config file says.
    pub async fn launch_session(&self, project: &Project) -> Result<(), SessionError> {
        if let Err(e) = template::migrate_legacy_config(&self.paths, project) {
            tracing::warn!("legacy config migration failed for {}: {e}", project.name);
        }
        let config = template::template_path(project);
        if !config.is_file() {
            return Err(SessionError::ConfigNotFound(config));
        }
        self.run_loader(&config, &project.name).await
    }

    async fn run_loader(&self, config: &Path, session_name: &str) -> Result<(), SessionError> {
        let config = config.to_string_lossy();
        let args = ["load", "-d", "-s", session_name, &*config];
        let output = match self.runner().run(LOADER, &args, None).await {
            Ok(output) => output,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SessionError::LoaderMissing)
            }
            Err(e) => return Err(e.into()),
        };
        if !output.success {
            let stderr = output.stderr.trim();
            let reason = if stderr.is_empty() {
                output.stdout.trim()
            } else {
                stderr
            };
            return Err(SessionError::LaunchFailed(reason.to_string()));
        }
        Ok(())
    }

    pub async fn attach_session(&self, name: &str) -> Result<(), SessionError> {
        if !self.session_exists(name).await {
            return Err(SessionError::NotFound(name.to_string()));
        }
        let attach_failed = |reason: String| SessionError::AttachFailed {
            name: name.to_string(),
            reason,
        };

        if self.inside_tmux {
            // Pin the client; from a popup tmux may otherwise pick the wrong one
            let tty = self.client_tty().await;
            return self
                .tmux
                .switch_client(name, tty.as_deref())
                .await
                .map_err(|e| attach_failed(e.to_string()));
        }

        match self.tmux.attach(name).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(attach_failed("tmux attach-session exited with an error".to_string())),
            Err(e) => Err(attach_failed(e.to_string())),
        }
    }

    pub async fn kill_session(&self, name: &str) -> Result<(), SessionError> {
        if !self.session_exists(name).await {
            return Err(SessionError::NotFound(name.to_string()));
        }
        self.tmux
            .kill_session(name)
            .await
            .map_err(|e| SessionError::KillFailed {
                name: name.to_string(),
                reason: match e {
                    TmuxError::Failed { stderr, .. } => stderr,
                    other => other.to_string(),
                },
            })
    }

    /// tmuxp returns before the session is queryable, so poll for it.
    pub async fn wait_until_ready(&self, name: &str) -> Result<(), SessionError> {
        for attempt in 0..self.poll_attempts {
            if self.session_exists(name).await {
                tracing::debug!("{name} ready after {attempt} polls");
                return Ok(());
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        Err(SessionError::StartTimeout {
            name: name.to_string(),
            waited: self.poll_interval * self.poll_attempts,
        })
    }

    pub async fn launch_or_attach(&self, project: &Project) -> Result<(), SessionError> {
        if !self.session_exists(&project.name).await {
            self.launch_session(project).await?;
            self.wait_until_ready(&project.name).await?;
        }
        self.attach_session(&project.name).await
    }

    /// Launch a session for an unregistered directory and return its name.
    ///
    /// The name never collides with a live session. The generated layout
    /// lives in a temp file that is removed however this returns.
    pub async fn launch_adhoc_session(
        &self,
        directory: impl AsRef<Path>,
        name: Option<&str>,
    ) -> Result<String, SessionError> {
        let directory = paths::validate_project_path(directory)?;
        let base = match name {
            Some(name) => paths::sanitize_session_name(name),
            None => paths::session_name_from_path(&directory),
        };
        let live: HashSet<String> = self.list_session_names().await.into_iter().collect();
        let session_name = unique_session_name(&base, &live);

        let doc = template::generate_adhoc_config(
            &session_name,
            &directory,
            detect_project_type(&directory),
        );
        let yaml = doc.to_yaml().map_err(|source| TemplateError::Yaml {
            path: PathBuf::from(&session_name),
            source,
        })?;

        let mut config = tempfile::Builder::new()
            .prefix("kata-adhoc-")
            .suffix(".yaml")
            .tempfile()?;
        config.write_all(yaml.as_bytes())?;
        config.flush()?;

        self.run_loader(config.path(), &session_name).await?;
        Ok(session_name)
    }

    /// Attach to the directory's session, launching it first if needed.
    pub async fn launch_or_attach_adhoc(
        &self,
        directory: impl AsRef<Path>,
    ) -> Result<String, SessionError> {
        let directory = paths::validate_project_path(directory)?;
        let mut name = paths::session_name_from_path(&directory);
        if !self.session_exists(&name).await {
            name = self.launch_adhoc_session(&directory, None).await?;
            self.wait_until_ready(&name).await?;
        }
        self.attach_session(&name).await?;
        Ok(name)
    }

    /// Reconstruct a live session's windows and panes.
    pub async fn get_session_layout(&self, name: &str) -> Result<LayoutDocument, SessionError> {
        if !self.session_exists(name).await {
            return Err(SessionError::NotFound(name.to_string()));
        }
        self.capture(name, None).await
    }

    /// Capture the project's live session over its config file.
    pub async fn save_current_session_layout(
        &self,
        project: &Project,
    ) -> Result<PathBuf, SessionError> {
        if !self.session_exists(&project.name).await {
            return Err(SessionError::NotFound(project.name.clone()));
        }
        let captured = self.capture(&project.name, Some(&project.path)).await?;

        let mut doc = LayoutDocument::skeleton(&project.name, &project.path);
        doc.windows = captured.windows;
        let path = template::template_path(project);
        template::write_document(&path, &doc)?;
        Ok(path)
    }

    /// Pane directories equal to `base` (default: the session path) are omitted.
    async fn capture(&self, name: &str, base: Option<&Path>) -> Result<LayoutDocument, SessionError> {
        let failed = |e: TmuxError| SessionError::CaptureFailed {
            name: name.to_string(),
            reason: e.to_string(),
        };

        let session_path = self.tmux.session_path(name).await.map_err(failed)?;
        let base = base
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|| session_path.clone());

        let tmux_windows = self.tmux.list_windows(name).await.map_err(failed)?;
        let mut panes_by_window = Vec::with_capacity(tmux_windows.len());
        for window in &tmux_windows {
            panes_by_window.push(self.tmux.list_panes(name, &window.index).await.map_err(failed)?);
        }
        let processes = self.tmux.process_table().await.map_err(failed)?;

        let windows = tmux_windows
            .into_iter()
            .zip(panes_by_window)
            .map(|(window, panes)| {
                let panes = panes
                    .into_iter()
                    .map(|pane| Pane {
                        shell_command: resolve_pane_command(pane.pid, &processes),
                        start_directory: (pane.current_path != base).then_some(pane.current_path),
                    })
                    .collect();
                Window {
                    window_name: window.name,
                    layout: Some(window.layout),
                    panes,
                }
            })
            .collect();

        let mut doc = LayoutDocument::skeleton(name, &session_path);
        doc.windows = windows;
        Ok(doc)
    }
}

/// `base`, then `base-1`, `base-2`, ... ; a unix timestamp suffix once
/// every candidate is taken.
pub fn unique_session_name(base: &str, live: &HashSet<String>) -> String {
    std::iter::once(base.to_string())
        .chain((1..ADHOC_NAME_ATTEMPTS).map(|n| format!("{base}-{n}")))
        .find(|candidate| !live.contains(candidate))
        .unwrap_or_else(|| format!("{base}-{}", chrono::Utc::now().timestamp()))
}
