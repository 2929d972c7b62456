//! Inferring what a pane is running from a process table snapshot.
//!
//! This is best effort: processes can come and go between listing the panes
//! and taking the snapshot, so callers should expect "some plausible command
//! or nothing", never an exact answer.

use once_cell::sync::Lazy;
use regex::Regex;

/// One row of `ps -A -o pid=,ppid=,args=`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub ppid: u32,
    pub args: String,
}

static RE_PS_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+)\s+(\d+)\s+(.+?)\s*$").unwrap());

/// Programs that run another program named by their first argument
static RE_INTERPRETER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(node|nodejs|bun|deno|ruby|perl|php|python[0-9.]*|pypy[0-9.]*)$").unwrap()
});

static RE_SHELL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?(bash|zsh|fish|sh|dash|ksh|mksh|tcsh|csh|nu|elvish|xonsh)$").unwrap());

/// Parse `ps` output, skipping anything that does not look like a row.
pub fn parse_process_table(raw: &str) -> Vec<ProcessEntry> {
    raw.lines()
        .filter_map(|line| {
            let caps = RE_PS_LINE.captures(line)?;
            Some(ProcessEntry {
                pid: caps[1].parse().ok()?,
                ppid: caps[2].parse().ok()?,
                args: caps[3].to_string(),
            })
        })
        .collect()
}

fn program_name(token: &str) -> &str {
    token.rsplit('/').next().unwrap_or(token)
}

fn first_token(args: &str) -> &str {
    args.split_whitespace().next().unwrap_or_default()
}

pub fn is_shell(args: &str) -> bool {
    RE_SHELL.is_match(program_name(first_token(args)))
}

pub fn is_interpreter(args: &str) -> bool {
    RE_INTERPRETER.is_match(program_name(first_token(args)))
}

/// Turn a raw command line into something worth re-running in a pane.
///
/// `node /usr/local/bin/nx run build` becomes `nx run build`, and absolute
/// program paths are reduced to their basename.
pub fn display_command(args: &str) -> String {
    let tokens: Vec<&str> = args.split_whitespace().collect();
    let Some((&first, rest)) = tokens.split_first() else {
        return String::new();
    };

    if is_interpreter(first) {
        // Skip interpreter flags to reach the script
        if let Some(pos) = rest.iter().position(|t| !t.starts_with('-')) {
            let mut parts = vec![program_name(rest[pos])];
            parts.extend(&rest[pos + 1..]);
            return parts.join(" ");
        }
        return program_name(first).to_string();
    }

    let mut parts = vec![program_name(first)];
    parts.extend(rest);
    parts.join(" ")
}

/// Resolve the foreground command for the pane whose root process is `pane_pid`.
///
/// Returns an empty list when the pane is sitting at a shell prompt.
pub fn resolve_pane_command(pane_pid: u32, table: &[ProcessEntry]) -> Vec<String> {
    let Some(root) = table.iter().find(|p| p.pid == pane_pid) else {
        return Vec::new();
    };

    // Pane started directly with a program rather than a shell
    if !is_shell(&root.args) {
        return vec![display_command(&root.args)];
    }

    let mut children: Vec<&ProcessEntry> = table
        .iter()
        .filter(|p| p.ppid == pane_pid && !is_shell(&p.args))
        .collect();
    children.sort_by_key(|p| p.pid);

    let chosen = children
        .iter()
        .find(|p| !is_interpreter(&p.args))
        .or_else(|| children.last());

    match chosen {
        Some(process) => vec![display_command(&process.args)],
        None => Vec::new(),
    }
}
