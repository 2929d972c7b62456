//! Quick switching through fzf, fed by the registry and zoxide.

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::project::Project;
use crate::tmux::CommandRunner;

pub const DEFAULT_ZOXIDE_LIMIT: usize = 50;
const ZOXIDE_TIMEOUT: Duration = Duration::from_secs(5);

const CYAN: &str = "\x1b[36m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";

static RE_ANSI: Lazy<Regex> = Lazy::new(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap());

/// A frequently visited directory
#[derive(Debug, Clone, PartialEq)]
pub struct ZoxideEntry {
    pub path: PathBuf,
    pub score: f64,
    pub name: String,
}

/// What a switcher line points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchTarget {
    Project(String),
    Directory(PathBuf),
}

/// Parse `zoxide query -l -s` output (`score path` per line, best first).
///
/// Excluded paths, the home directory and directories that no longer exist
/// are dropped.
pub fn parse_zoxide_output(
    raw: &str,
    limit: usize,
    exclude: &HashSet<PathBuf>,
    home: Option<&Path>,
) -> Vec<ZoxideEntry> {
    raw.lines()
        .filter_map(|line| {
            let (score, path) = line.trim().split_once(char::is_whitespace)?;
            let score: f64 = score.parse().ok()?;
            let path = PathBuf::from(path.trim());
            if exclude.contains(&path) || home == Some(path.as_path()) || !path.is_dir() {
                return None;
            }
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.to_string_lossy().to_string());
            Some(ZoxideEntry { path, score, name })
        })
        .take(limit)
        .collect()
}

/// Best-effort zoxide lookup; a missing or failing zoxide yields nothing.
pub async fn query_zoxide<R: CommandRunner>(
    runner: &R,
    limit: usize,
    exclude: &HashSet<PathBuf>,
) -> Vec<ZoxideEntry> {
    match runner
        .run("zoxide", &["query", "-l", "-s"], Some(ZOXIDE_TIMEOUT))
        .await
    {
        Ok(output) if output.success => {
            parse_zoxide_output(&output.stdout, limit, exclude, dirs::home_dir().as_deref())
        }
        Ok(output) => {
            tracing::debug!("zoxide failed: {}", output.stderr.trim());
            Vec::new()
        }
        Err(e) => {
            tracing::debug!("zoxide unavailable: {e}");
            Vec::new()
        }
    }
}

/// Picker lines: projects in cyan sorted by group and name, then zoxide
/// directories in yellow with their path last.
pub fn build_switch_items(projects: &[&Project], zoxide: &[ZoxideEntry]) -> Vec<String> {
    let mut sorted = projects.to_vec();
    sorted.sort_by(|a, b| (&a.group, &a.name).cmp(&(&b.group, &b.name)));

    let registered = sorted
        .into_iter()
        .map(|p| format!("{CYAN}  {}{RESET}", p.name));
    let directories = zoxide
        .iter()
        .map(|e| format!("{YELLOW}  {}{RESET}  {}", e.name, e.path.display()));
    registered.chain(directories).collect()
}

/// Map a picked line back to its target. Works whether or not the picker
/// kept the colour codes.
pub fn parse_selection(selection: &str) -> Option<SwitchTarget> {
    let clean = RE_ANSI.replace_all(selection, "");
    let clean = clean.trim();
    if clean.is_empty() {
        return None;
    }
    if let Some((_, path)) = clean.split_once("  /") {
        return Some(SwitchTarget::Directory(PathBuf::from(format!("/{}", path.trim()))));
    }
    Some(SwitchTarget::Project(clean.to_string()))
}

/// Show `items` in fzf and return the chosen line, or `None` if cancelled.
pub async fn run_fzf(items: &[String], header: Option<&str>) -> Result<Option<String>> {
    let mut cmd = Command::new("fzf");
    cmd.arg("--ansi");
    if let Some(header) = header {
        cmd.args(["--header", header]);
    }

    // fzf draws on /dev/tty, so only stdin and stdout are captured
    let mut child = match cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            bail!("fzf is not installed (macOS: brew install fzf, Ubuntu: sudo apt install fzf)")
        }
        Err(e) => return Err(e).context("failed to start fzf"),
    };

    if let Some(mut stdin) = child.stdin.take() {
        let input = items.join("\n");
        // fzf may exit before reading everything; that is a cancel, not an error
        if let Err(e) = stdin.write_all(input.as_bytes()).await {
            tracing::debug!("fzf closed stdin early: {e}");
        }
    }

    let output = child.wait_with_output().await.context("fzf failed")?;
    if !output.status.success() {
        return Ok(None);
    }
    let selected = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok((!selected.is_empty()).then_some(selected))
}
