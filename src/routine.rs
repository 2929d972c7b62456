//! The morning routine: groups and projects launched detached in one go.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

use crate::paths::KataPaths;
use crate::project::Project;
use crate::registry::Registry;
use crate::sessions::SessionManager;
use crate::store::{self, StoreError};
use crate::tmux::CommandRunner;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutineConfig {
    pub groups: Vec<String>,
    pub projects: Vec<String>,
}

/// Outcome for one project in a batch launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchResult {
    pub project: String,
    pub success: bool,
    /// Session was already running
    pub skipped: bool,
    pub error: Option<String>,
}

impl LaunchResult {
    fn launched(project: &str) -> Self {
        Self {
            project: project.to_string(),
            success: true,
            skipped: false,
            error: None,
        }
    }

    fn skipped(project: &str) -> Self {
        Self {
            skipped: true,
            ..Self::launched(project)
        }
    }

    fn failed(project: &str, error: impl ToString) -> Self {
        Self {
            project: project.to_string(),
            success: false,
            skipped: false,
            error: Some(error.to_string()),
        }
    }
}

/// Loads and saves `routine.json`
#[derive(Debug, Clone)]
pub struct RoutineStore {
    file: PathBuf,
}

impl RoutineStore {
    pub fn new(paths: &KataPaths) -> Self {
        Self {
            file: paths.routine_file(),
        }
    }

    /// Missing or unreadable routine files read as an empty routine.
    pub fn load(&self) -> RoutineConfig {
        store::read_json_or_default(&self.file)
    }

    pub fn save(&self, config: &RoutineConfig) -> Result<(), StoreError> {
        store::write_json(&self.file, config)
    }

    /// Returns false if the group was already in the routine.
    pub fn add_group(&self, group: &str) -> Result<bool, StoreError> {
        self.modify(|c| push_unique(&mut c.groups, group))
    }

    /// Returns false if the group was not in the routine.
    pub fn remove_group(&self, group: &str) -> Result<bool, StoreError> {
        self.modify(|c| remove_item(&mut c.groups, group))
    }

    pub fn add_project(&self, name: &str) -> Result<bool, StoreError> {
        self.modify(|c| push_unique(&mut c.projects, name))
    }

    pub fn remove_project(&self, name: &str) -> Result<bool, StoreError> {
        self.modify(|c| remove_item(&mut c.projects, name))
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.save(&RoutineConfig::default())
    }

    /// Persist only when `change` reports a change.
    fn modify(&self, change: impl FnOnce(&mut RoutineConfig) -> bool) -> Result<bool, StoreError> {
        let mut config = self.load();
        let changed = change(&mut config);
        if changed {
            self.save(&config)?;
        }
        Ok(changed)
    }
}

fn push_unique(items: &mut Vec<String>, item: &str) -> bool {
    if items.iter().any(|i| i == item) {
        return false;
    }
    items.push(item.to_string());
    true
}

fn remove_item(items: &mut Vec<String>, item: &str) -> bool {
    let before = items.len();
    items.retain(|i| i != item);
    items.len() != before
}

async fn launch_background<R: CommandRunner>(
    sessions: &SessionManager<R>,
    project: &Project,
) -> LaunchResult {
    if sessions.session_exists(&project.name).await {
        tracing::debug!("routine: {} already running", project.name);
        return LaunchResult::skipped(&project.name);
    }
    match sessions.launch_session(project).await {
        Ok(()) => LaunchResult::launched(&project.name),
        Err(e) => {
            tracing::warn!("routine: failed to launch {}: {e}", project.name);
            LaunchResult::failed(&project.name, e)
        }
    }
}

/// Launch every project in `group` detached.
pub async fn launch_group_background<R: CommandRunner>(
    registry: &Registry,
    sessions: &SessionManager<R>,
    group: &str,
) -> Vec<LaunchResult> {
    let mut results = Vec::new();
    for project in registry.list_by_group(group) {
        results.push(launch_background(sessions, project).await);
    }
    results
}

/// Launch named projects detached; unknown names become failures, not errors.
pub async fn launch_projects_background<R: CommandRunner>(
    registry: &Registry,
    sessions: &SessionManager<R>,
    names: &[String],
) -> Vec<LaunchResult> {
    let mut results = Vec::new();
    for name in names {
        let result = match registry.get(name) {
            Ok(project) => launch_background(sessions, project).await,
            Err(e) => LaunchResult::failed(name, e),
        };
        results.push(result);
    }
    results
}

/// Groups first, then individually listed projects not already covered.
pub async fn run_morning_routine<R: CommandRunner>(
    config: &RoutineConfig,
    registry: &Registry,
    sessions: &SessionManager<R>,
) -> Vec<LaunchResult> {
    let mut results = Vec::new();
    for group in &config.groups {
        results.extend(launch_group_background(registry, sessions, group).await);
    }

    let covered: HashSet<String> = results.iter().map(|r| r.project.clone()).collect();
    let remaining: Vec<String> = config
        .projects
        .iter()
        .filter(|name| !covered.contains(*name))
        .cloned()
        .collect();
    results.extend(launch_projects_background(registry, sessions, &remaining).await);
    results
}

/// Registered projects the routine would launch, without duplicates.
/// Names missing from the registry are left out.
pub fn routine_projects<'a>(config: &RoutineConfig, registry: &'a Registry) -> Vec<&'a Project> {
    let mut seen = HashSet::new();
    let grouped = config
        .groups
        .iter()
        .flat_map(|group| registry.list_by_group(group));
    let listed = config
        .projects
        .iter()
        .filter_map(|name| registry.get(name).ok());

    grouped
        .chain(listed)
        .filter(|project| seen.insert(project.name.clone()))
        .collect()
}
