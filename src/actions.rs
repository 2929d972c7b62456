use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::picker::DEFAULT_ZOXIDE_LIMIT;
use crate::scanner::DEFAULT_SCAN_DEPTH;
use crate::template::LayoutPreset;

#[derive(Debug, Parser)]
#[command(
    name = "kata",
    version,
    about = "Terminal-centric workspace orchestrator for tmux",
    after_help = "Run without a command to pick a project with fzf."
)]
pub struct Cli {
    #[command(subcommand)]
    pub action: Option<Action>,
}

/// Actions that can be dispatched through the application
#[derive(Debug, Clone, Subcommand)]
pub enum Action {
    /// Register a project directory and generate its layout
    Add {
        /// Project directory (defaults to the current directory)
        path: Option<PathBuf>,
        /// Group to file the project under
        #[arg(short, long)]
        group: Option<String>,
        /// Project name (defaults to the directory name)
        #[arg(short, long)]
        name: Option<String>,
        /// Window preset for the generated layout
        #[arg(short, long, value_enum)]
        layout: Option<LayoutPreset>,
    },
    /// List registered projects with their session status
    List {
        #[arg(short, long)]
        group: Option<String>,
    },
    /// Unregister a project (its directory and layout file are left alone)
    Remove {
        name: String,
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },
    /// Launch or attach to a project's session, by name or shortcut digit
    Launch { target: String },
    /// Open a session for any directory without registering it
    Open {
        /// Directory (defaults to the current directory)
        path: Option<PathBuf>,
        /// Session name (defaults to the directory name)
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Kill a session, or every session belonging to a registered project
    Kill {
        name: Option<String>,
        #[arg(short, long, conflicts_with = "name")]
        all: bool,
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },
    /// Find project directories and offer to register them
    Scan {
        /// Directory to scan (defaults to the current directory)
        path: Option<PathBuf>,
        #[arg(short, long, default_value_t = DEFAULT_SCAN_DEPTH)]
        depth: usize,
        #[arg(short, long)]
        group: Option<String>,
        /// Include hidden directories
        #[arg(long)]
        hidden: bool,
        /// Register everything found without prompting
        #[arg(short, long)]
        yes: bool,
    },
    /// Move a project to another group
    Move { name: String, group: String },
    /// Rename a project
    Rename { name: String, new_name: String },
    /// Assign a 1-9 shortcut to a project, or clear it when no digit is given
    Shortcut { name: String, digit: Option<u8> },
    /// Open a project's layout file in $EDITOR
    Edit { name: String },
    /// Regenerate a project's layout file from its detected type
    Regenerate {
        name: String,
        #[arg(short, long, value_enum)]
        layout: Option<LayoutPreset>,
        /// Overwrite without confirmation
        #[arg(short, long)]
        force: bool,
    },
    /// Save the live session's windows and panes as the project's layout
    SaveLayout {
        /// Project name, or any session name with --print
        name: String,
        /// Print the captured layout instead of writing it
        #[arg(short, long)]
        print: bool,
    },
    /// Manage and run the morning routine
    Routine {
        #[command(subcommand)]
        action: Option<RoutineAction>,
    },
    /// Re-open the switcher after detaching from a session
    Loop {
        #[command(subcommand)]
        action: Option<LoopAction>,
    },
    /// Show or change settings
    Settings {
        #[arg(long)]
        default_group: Option<String>,
        /// Seconds between status refreshes (1-60)
        #[arg(long)]
        refresh_interval: Option<i64>,
        #[arg(long)]
        theme: Option<String>,
    },
    /// Pick a project or recent directory with fzf and switch to it
    Switch {
        /// Leave zoxide directories out
        #[arg(long)]
        no_zoxide: bool,
        #[arg(long, default_value_t = DEFAULT_ZOXIDE_LIMIT)]
        zoxide_limit: usize,
        /// Print the picker lines instead of running fzf
        #[arg(long, conflicts_with = "select")]
        list: bool,
        /// Switch to a line previously printed by --list
        #[arg(long)]
        select: Option<String>,
    },
    /// Move layout files from the central config directory into projects
    Migrate,
}

#[derive(Debug, Clone, Subcommand)]
pub enum RoutineAction {
    /// Launch every routine project in the background
    Run,
    /// Add a group (or a project with --project)
    Add {
        target: String,
        #[arg(short, long)]
        project: bool,
    },
    /// Remove a group (or a project with --project)
    Remove {
        target: String,
        #[arg(short, long)]
        project: bool,
    },
    /// Show the routine
    List,
    /// Empty the routine
    Clear {
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum LoopAction {
    Enable,
    Disable,
    Status,
}
