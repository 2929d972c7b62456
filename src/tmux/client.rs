use std::collections::HashMap;
use std::time::Duration;

use super::heuristics::{parse_process_table, ProcessEntry};
use super::runner::{CommandOutput, CommandRunner};
use super::{SessionStatus, TmuxError, TmuxPane, TmuxSession, TmuxWindow};

/// Upper bound for read-only tmux queries
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Exact-match session target, so `api` never resolves to `api-1`
fn session_target(name: &str) -> String {
    format!("={name}")
}

/// Exact-match target for the session's current window/pane
fn pane_target(name: &str) -> String {
    format!("={name}:")
}

/// Client for interacting with tmux via CLI
pub struct TmuxClient<R> {
    runner: R,
    /// Path to tmux binary
    tmux_path: String,
}

impl<R: CommandRunner> TmuxClient<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            tmux_path: "tmux".to_string(),
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    async fn query(&self, args: &[&str]) -> Result<CommandOutput, TmuxError> {
        self.runner
            .run(&self.tmux_path, args, Some(QUERY_TIMEOUT))
            .await
            .map_err(|source| TmuxError::Spawn {
                program: self.tmux_path.clone(),
                source,
            })
    }

    /// Run a query and insist on a zero exit
    async fn query_ok(&self, args: &[&str]) -> Result<String, TmuxError> {
        let output = self.query(args).await?;
        if !output.success {
            return Err(TmuxError::Failed {
                command: format!("tmux {}", args.first().copied().unwrap_or_default()),
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    /// Check if a session exists. No tmux server, or no tmux at all, means no.
    pub async fn has_session(&self, name: &str) -> bool {
        self.query(&["has-session", "-t", &session_target(name)])
            .await
            .map(|o| o.success)
            .unwrap_or(false)
    }

    /// List all tmux sessions
    pub async fn list_sessions(&self) -> Result<Vec<TmuxSession>, TmuxError> {
        // Format: session_name|session_attached
        let output = self
            .query(&["list-sessions", "-F", "#{session_name}|#{session_attached}"])
            .await?;

        if !output.success {
            let stderr = output.stderr.trim();
            if stderr.contains("no server running") || stderr.contains("no sessions") {
                return Ok(Vec::new());
            }
            return Err(TmuxError::Failed {
                command: "tmux list-sessions".to_string(),
                stderr: stderr.to_string(),
            });
        }

        Ok(output
            .stdout
            .lines()
            .filter_map(parse_session_line)
            .collect())
    }

    /// Status of every live session from a single query; failures read as no sessions
    pub async fn session_statuses(&self) -> HashMap<String, SessionStatus> {
        match self.list_sessions().await {
            Ok(sessions) => sessions
                .into_iter()
                .map(|s| {
                    let status = s.status();
                    (s.name, status)
                })
                .collect(),
            Err(e) => {
                tracing::debug!("treating tmux as empty: {e}");
                HashMap::new()
            }
        }
    }

    pub async fn session_status(&self, name: &str) -> SessionStatus {
        let output = self
            .query(&[
                "display-message",
                "-p",
                "-t",
                &pane_target(name),
                "#{session_attached}",
            ])
            .await;
        match output {
            Ok(o) if o.success => o
                .stdout
                .trim()
                .parse()
                .map(SessionStatus::from_attached)
                .unwrap_or(SessionStatus::Detached),
            _ => SessionStatus::Idle,
        }
    }

    /// TTY of the client this process is displayed in, if any.
    ///
    /// Works from inside popups, where `$TMUX` alone does not tell tmux
    /// which client to switch.
    pub async fn client_tty(&self) -> Option<String> {
        let output = self
            .query(&["display-message", "-p", "#{client_tty}"])
            .await
            .ok()?;
        let tty = output.stdout.trim();
        (output.success && !tty.is_empty()).then(|| tty.to_string())
    }

    pub async fn switch_client(&self, name: &str, client_tty: Option<&str>) -> Result<(), TmuxError> {
        let target = session_target(name);
        let mut args = vec!["switch-client", "-t", target.as_str()];
        if let Some(tty) = client_tty {
            args.extend(["-c", tty]);
        }
        self.query_ok(&args).await.map(|_| ())
    }

    /// Attach in the foreground; returns once the user detaches.
    pub async fn attach(&self, name: &str) -> Result<bool, TmuxError> {
        self.runner
            .run_interactive(&self.tmux_path, &["attach-session", "-t", &session_target(name)])
            .await
            .map_err(|source| TmuxError::Spawn {
                program: self.tmux_path.clone(),
                source,
            })
    }

    /// Kill a session
    pub async fn kill_session(&self, name: &str) -> Result<(), TmuxError> {
        self.query_ok(&["kill-session", "-t", &session_target(name)])
            .await
            .map(|_| ())
    }

    pub async fn session_path(&self, name: &str) -> Result<String, TmuxError> {
        let out = self
            .query_ok(&["display-message", "-p", "-t", &pane_target(name), "#{session_path}"])
            .await?;
        Ok(out.trim().to_string())
    }

    pub async fn list_windows(&self, name: &str) -> Result<Vec<TmuxWindow>, TmuxError> {
        let out = self
            .query_ok(&[
                "list-windows",
                "-t",
                &session_target(name),
                "-F",
                "#{window_index}|#{window_name}|#{window_layout}",
            ])
            .await?;

        out.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|line| {
                // Window names may contain '|', the index and layout cannot
                let parse_err = || TmuxError::Parse {
                    command: "tmux list-windows".to_string(),
                    line: line.to_string(),
                };
                let (index, rest) = line.split_once('|').ok_or_else(parse_err)?;
                let (name, layout) = rest.rsplit_once('|').ok_or_else(parse_err)?;
                Ok(TmuxWindow {
                    index: index.to_string(),
                    name: name.to_string(),
                    layout: layout.to_string(),
                })
            })
            .collect()
    }

    pub async fn list_panes(&self, name: &str, window_index: &str) -> Result<Vec<TmuxPane>, TmuxError> {
        let target = format!("={name}:{window_index}");
        let out = self
            .query_ok(&["list-panes", "-t", &target, "-F", "#{pane_pid}|#{pane_current_path}"])
            .await?;

        out.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|line| {
                let parsed = line
                    .split_once('|')
                    .and_then(|(pid, path)| Some((pid.parse().ok()?, path)));
                match parsed {
                    Some((pid, path)) => Ok(TmuxPane {
                        pid,
                        current_path: path.to_string(),
                    }),
                    None => Err(TmuxError::Parse {
                        command: "tmux list-panes".to_string(),
                        line: line.to_string(),
                    }),
                }
            })
            .collect()
    }

    /// Snapshot of every process on the system
    pub async fn process_table(&self) -> Result<Vec<ProcessEntry>, TmuxError> {
        let output = self
            .runner
            .run("ps", &["-A", "-o", "pid=,ppid=,args="], Some(QUERY_TIMEOUT))
            .await
            .map_err(|source| TmuxError::Spawn {
                program: "ps".to_string(),
                source,
            })?;
        if !output.success {
            return Err(TmuxError::Failed {
                command: "ps".to_string(),
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(parse_process_table(&output.stdout))
    }
}

/// Parse a `name|attached` line; session names may themselves contain `|`
fn parse_session_line(line: &str) -> Option<TmuxSession> {
    let (name, attached) = line.rsplit_once('|')?;
    if name.is_empty() {
        return None;
    }
    Some(TmuxSession {
        name: name.to_string(),
        attached_clients: attached.trim().parse().unwrap_or(0),
    })
}
