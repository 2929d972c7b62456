mod client;
mod heuristics;
mod runner;

pub use client::TmuxClient;
pub use heuristics::resolve_pane_command;
pub use runner::{CommandRunner, SystemRunner};

#[cfg(test)]
pub use runner::fake;

use std::fmt;
use std::io;
use thiserror::Error;

/// Observed state of a named session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionStatus {
    /// No tmux session by that name
    #[default]
    Idle,
    /// Session exists, nobody attached
    Detached,
    /// Session exists with at least one attached client
    Active,
}

impl SessionStatus {
    pub fn from_attached(attached_clients: usize) -> Self {
        if attached_clients > 0 {
            Self::Active
        } else {
            Self::Detached
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Detached => "detached",
            Self::Active => "active",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents a tmux session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmuxSession {
    pub name: String,
    /// Number of attached clients
    pub attached_clients: usize,
}

impl TmuxSession {
    pub fn status(&self) -> SessionStatus {
        SessionStatus::from_attached(self.attached_clients)
    }
}

/// A window as reported by `list-windows`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmuxWindow {
    pub index: String,
    pub name: String,
    pub layout: String,
}

/// A pane as reported by `list-panes`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmuxPane {
    pub pid: u32,
    pub current_path: String,
}

#[derive(Debug, Error)]
pub enum TmuxError {
    #[error("failed to run {program}: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("{command} failed: {stderr}")]
    Failed { command: String, stderr: String },
    #[error("unexpected output from {command}: {line}")]
    Parse { command: String, line: String },
}
