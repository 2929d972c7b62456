use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::Stdio;

use crate::actions::{Action, LoopAction, RoutineAction};
use crate::detect::detect_project_type;
use crate::paths::{self, KataPaths};
use crate::picker::{self, SwitchTarget, DEFAULT_ZOXIDE_LIMIT};
use crate::project::Project;
use crate::registry::Registry;
use crate::routine::{self, LaunchResult, RoutineStore};
use crate::scanner;
use crate::sessions::SessionManager;
use crate::settings::{SettingsStore, AVAILABLE_THEMES};
use crate::template::{self, LayoutPreset};
use crate::tmux::{CommandRunner, SessionStatus, SystemRunner};

const SWITCH_HEADER: &str = "Select a project/directory (Enter to switch, Esc to cancel)";

/// Everything a command needs, built once per process
pub struct App<R = SystemRunner> {
    pub paths: KataPaths,
    pub registry: Registry,
    pub settings: SettingsStore,
    pub routine: RoutineStore,
    pub sessions: SessionManager<R>,
}

impl App {
    pub fn new(paths: KataPaths) -> Self {
        Self::with_runner(paths, SystemRunner)
    }
}

impl<R: CommandRunner> App<R> {
    pub fn with_runner(paths: KataPaths, runner: R) -> Self {
        Self {
            registry: Registry::open(paths.registry_file()),
            settings: SettingsStore::new(&paths),
            routine: RoutineStore::new(&paths),
            sessions: SessionManager::new(runner, paths.clone()),
            paths,
        }
    }

    /// Handle an action; `None` runs the switcher
    pub async fn handle_action(&mut self, action: Option<Action>) -> Result<()> {
        let Some(action) = action else {
            return self.switcher_loop().await;
        };

        match action {
            Action::Add {
                path,
                group,
                name,
                layout,
            } => self.add(path, group, name, layout),
            Action::List { group } => self.list(group.as_deref()).await,
            Action::Remove { name, force } => self.remove(&name, force),
            Action::Launch { target } => self.launch(&target).await,
            Action::Open { path, name } => self.open(path, name.as_deref()).await,
            Action::Kill { name, all, force } => self.kill(name.as_deref(), all, force).await,
            Action::Scan {
                path,
                depth,
                group,
                hidden,
                yes,
            } => self.scan(path, depth, group, hidden, yes),
            Action::Move { name, group } => {
                let mut project = self.registry.get(&name)?.clone();
                let old_group = std::mem::replace(&mut project.group, group.clone());
                self.registry.update(project)?;
                println!("✓ Moved {name} from {old_group} to {group}");
                Ok(())
            }
            Action::Rename { name, new_name } => {
                let project = self.registry.rename(&name, &new_name)?;
                template::sync_session_name(&project)?;
                println!("✓ Renamed {name} to {}", project.name);
                if self.sessions.session_exists(&name).await {
                    println!("  The running session keeps its old name until it is relaunched.");
                }
                Ok(())
            }
            Action::Shortcut { name, digit } => {
                self.registry.set_shortcut(&name, digit)?;
                match digit {
                    Some(digit) => println!("✓ {name} is now on shortcut {digit}"),
                    None => println!("✓ Cleared shortcut for {name}"),
                }
                Ok(())
            }
            Action::Edit { name } => self.edit(&name).await,
            Action::Regenerate {
                name,
                layout,
                force,
            } => self.regenerate(&name, layout, force),
            Action::SaveLayout { name, print: true } => {
                let doc = self.sessions.get_session_layout(&name).await?;
                print!("{}", doc.to_yaml()?);
                Ok(())
            }
            Action::SaveLayout { name, print: false } => {
                let project = self.registry.get(&name)?;
                let path = self.sessions.save_current_session_layout(project).await?;
                println!("✓ Saved layout of {name} to {}", path.display());
                Ok(())
            }
            Action::Routine { action } => self.routine(action.unwrap_or(RoutineAction::Run)).await,
            Action::Loop { action } => self.loop_config(action.unwrap_or(LoopAction::Status)),
            Action::Settings {
                default_group,
                refresh_interval,
                theme,
            } => self.configure(default_group, refresh_interval, theme),
            Action::Switch {
                no_zoxide,
                zoxide_limit,
                list,
                select,
            } => {
                let limit = (!no_zoxide).then_some(zoxide_limit);
                if list {
                    for item in self.switch_items(limit).await {
                        println!("{item}");
                    }
                    return Ok(());
                }
                if let Some(selection) = select {
                    return self.switch_to_selection(&selection).await.map(|_| ());
                }
                self.switch(limit).await.map(|_| ())
            }
            Action::Migrate => {
                self.migrate();
                Ok(())
            }
        }
    }

    fn default_group(&self) -> String {
        self.settings.load().default_group
    }

    fn add(
        &mut self,
        path: Option<PathBuf>,
        group: Option<String>,
        name: Option<String>,
        layout: Option<LayoutPreset>,
    ) -> Result<()> {
        let path = paths::validate_project_path(path.unwrap_or_else(|| PathBuf::from(".")))?;
        let group = group.unwrap_or_else(|| self.default_group());
        let project = match name {
            Some(name) => Project::new(name, &path, group),
            None => Project::from_path(&path, group),
        };
        let ty = detect_project_type(&path);
        let project = self.registry.add(project)?;

        let config = template::ensure_template(&project, ty, layout)?;

        println!("✓ Added project: {}", project.name);
        println!("  Path:   {}", project.path.display());
        println!("  Type:   {ty}");
        println!("  Group:  {}", project.group);
        println!("  Config: {}", config.display());
        Ok(())
    }

    async fn list(&self, group: Option<&str>) -> Result<()> {
        let mut projects = match group {
            Some(group) => self.registry.list_by_group(group),
            None => self.registry.list_all(),
        };
        if projects.is_empty() {
            println!("No projects registered yet.");
            println!("Use `kata add` to add a project.");
            return Ok(());
        }
        projects.sort_by(|a, b| (&a.group, &a.name).cmp(&(&b.group, &b.name)));

        let statuses = self.sessions.get_all_session_statuses().await;
        let name_width = projects.iter().map(|p| p.name.len()).max().unwrap_or(4).max(4);
        let group_width = projects.iter().map(|p| p.group.len()).max().unwrap_or(5).max(5);

        println!(
            "{:<11} {:<3} {:<name_width$} {:<group_width$} PATH",
            "STATUS", "KEY", "NAME", "GROUP"
        );
        for project in projects {
            let status = statuses.get(&project.name).copied().unwrap_or_default();
            let key = project.shortcut.map(|s| s.to_string()).unwrap_or_default();
            println!(
                "{:<11} {:<3} {:<name_width$} {:<group_width$} {}",
                status_label(status),
                key,
                project.name,
                project.group,
                project.path.display()
            );
        }
        Ok(())
    }

    fn remove(&mut self, name: &str, force: bool) -> Result<()> {
        let project = self.registry.get(name)?;
        if !force && !confirm(&format!("Remove project '{}'?", project.name))? {
            println!("Cancelled.");
            return Ok(());
        }
        self.registry.remove(name)?;
        println!("✓ Removed project: {name}");
        Ok(())
    }

    /// Look a project up by name, falling back to a shortcut digit
    fn resolve_target(&self, target: &str) -> Result<Project> {
        if let Ok(project) = self.registry.get(target) {
            return Ok(project.clone());
        }
        if let Some(project) = target
            .parse::<u8>()
            .ok()
            .and_then(|digit| self.registry.find_by_shortcut(digit))
        {
            return Ok(project.clone());
        }
        Ok(self.registry.get(target)?.clone())
    }

    async fn launch_project(&mut self, mut project: Project) -> Result<()> {
        project.record_open();
        self.registry.update(project.clone())?;
        self.sessions.launch_or_attach(&project).await?;
        Ok(())
    }

    async fn launch(&mut self, target: &str) -> Result<()> {
        let project = self.resolve_target(target)?;
        self.launch_project(project).await
    }

    async fn open(&self, path: Option<PathBuf>, name: Option<&str>) -> Result<()> {
        let dir = path.unwrap_or_else(|| PathBuf::from("."));
        match name {
            None => {
                self.sessions.launch_or_attach_adhoc(&dir).await?;
            }
            Some(name) => {
                let session = self.sessions.launch_adhoc_session(&dir, Some(name)).await?;
                self.sessions.wait_until_ready(&session).await?;
                self.sessions.attach_session(&session).await?;
            }
        }
        Ok(())
    }

    async fn kill(&self, name: Option<&str>, all: bool, force: bool) -> Result<()> {
        if !all {
            let Some(name) = name else {
                bail!("Provide a session name or use --all");
            };
            if !self.registry.contains(name) {
                eprintln!("Warning: '{name}' is not a registered project");
            }
            if !self.sessions.session_exists(name).await {
                bail!("No active session found: {name}");
            }
            if !force && !confirm(&format!("Kill session '{name}'?"))? {
                println!("Cancelled.");
                return Ok(());
            }
            self.sessions.kill_session(name).await?;
            println!("✓ Killed session: {name}");
            return Ok(());
        }

        let statuses = self.sessions.get_all_session_statuses().await;
        let mut targets: Vec<(&str, SessionStatus)> = self
            .registry
            .list_all()
            .into_iter()
            .filter_map(|p| statuses.get(&p.name).map(|s| (p.name.as_str(), *s)))
            .collect();
        targets.sort_by_key(|(name, _)| *name);
        if targets.is_empty() {
            println!("No active kata sessions to kill.");
            return Ok(());
        }

        println!("Found {} active session(s):", targets.len());
        for (name, status) in &targets {
            println!("  {:<11} {name}", status_label(*status));
        }
        if !force && !confirm("Kill all these sessions?")? {
            println!("Cancelled.");
            return Ok(());
        }

        let mut killed = 0;
        for (name, _) in targets {
            match self.sessions.kill_session(name).await {
                Ok(()) => {
                    println!("✓ Killed: {name}");
                    killed += 1;
                }
                Err(e) => println!("✗ Failed to kill {name}: {e}"),
            }
        }
        println!("Killed {killed} session(s).");
        Ok(())
    }

    fn scan(
        &mut self,
        path: Option<PathBuf>,
        depth: usize,
        group: Option<String>,
        hidden: bool,
        yes: bool,
    ) -> Result<()> {
        let root = paths::validate_project_path(path.unwrap_or_else(|| PathBuf::from(".")))?;
        let group = group.unwrap_or_else(|| self.default_group());
        println!("Scanning {} (depth: {depth})...", root.display());

        let discovered = scanner::scan_directory(&root, depth, hidden);
        if discovered.is_empty() {
            println!("No projects found.");
            return Ok(());
        }
        let fresh: Vec<PathBuf> = discovered
            .iter()
            .filter(|p| self.registry.find_by_path(p).is_none())
            .cloned()
            .collect();
        if fresh.is_empty() {
            println!(
                "Found {} project(s), but all are already registered.",
                discovered.len()
            );
            return Ok(());
        }

        println!("\nFound {} new project(s):\n", fresh.len());
        for (i, path) in fresh.iter().enumerate() {
            println!(
                "  {:>2}. {:<24} {:<8} {}",
                i + 1,
                paths::session_name_from_path(path),
                detect_project_type(path),
                path.display()
            );
        }
        println!();

        let selected = if yes {
            (0..fresh.len()).collect()
        } else {
            let answer = prompt("Enter numbers to import (comma-separated), 'all', or 'none' [all]: ")?;
            match parse_index_selection(&answer, fresh.len())? {
                Some(selected) => selected,
                None => {
                    println!("Cancelled.");
                    return Ok(());
                }
            }
        };

        let mut imported = 0;
        for index in selected {
            let path = &fresh[index];
            let project = Project::from_path(path, group.clone());
            match self.registry.add(project) {
                Ok(project) => {
                    template::ensure_template(&project, detect_project_type(path), None)?;
                    println!("✓ Imported: {}", project.name);
                    imported += 1;
                }
                Err(e) => println!("✗ Failed to import {}: {e}", path.display()),
            }
        }
        println!("\nImported {imported} project(s).");
        Ok(())
    }

    async fn edit(&self, name: &str) -> Result<()> {
        let project = self.registry.get(name)?;
        let config = template::template_path(project);
        if !config.exists() {
            bail!(
                "Config file not found: {} (run `kata regenerate {name}` to create it)",
                config.display()
            );
        }

        let editor = editor_command();
        let mut parts = editor.split_whitespace();
        let program = parts.next().unwrap_or("vi");
        println!("Opening {} with {editor}...", config.display());

        let status = tokio::process::Command::new(program)
            .args(parts)
            .arg(&config)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .with_context(|| format!("Editor not found: {editor} (set $EDITOR)"))?;
        if !status.success() {
            eprintln!("Warning: editor exited with {status}");
        }
        if let Err(e) = template::read_template(project) {
            eprintln!("Warning: {e}");
        }
        Ok(())
    }

    fn regenerate(&self, name: &str, layout: Option<LayoutPreset>, force: bool) -> Result<()> {
        let project = self.registry.get(name)?;
        if template::template_exists(project)
            && !force
            && !confirm(&format!("Overwrite {}?", template::template_path(project).display()))?
        {
            println!("Cancelled.");
            return Ok(());
        }
        let path = template::write_template(project, detect_project_type(&project.path), layout)?;
        println!("✓ Wrote {}", path.display());
        Ok(())
    }

    async fn routine(&self, action: RoutineAction) -> Result<()> {
        match action {
            RoutineAction::Run => {
                let config = self.routine.load();
                let planned = routine::routine_projects(&config, &self.registry).len();
                if config.groups.is_empty() && config.projects.is_empty() {
                    println!("No projects configured in routine.");
                    println!("Use `kata routine add <group>` to add groups.");
                    return Ok(());
                }
                println!("Starting morning routine ({planned} projects)...\n");
                let results =
                    routine::run_morning_routine(&config, &self.registry, &self.sessions).await;
                print_launch_results(&results);
            }
            RoutineAction::Add { target, project } => {
                let added = if project {
                    self.registry.get(&target)?;
                    self.routine.add_project(&target)?
                } else {
                    if !self.registry.groups().contains(&target) {
                        eprintln!("Warning: group '{target}' doesn't exist yet");
                    }
                    self.routine.add_group(&target)?
                };
                if added {
                    println!("✓ Added {target} to routine");
                } else {
                    println!("Already in routine: {target}");
                }
            }
            RoutineAction::Remove { target, project } => {
                let removed = if project {
                    self.routine.remove_project(&target)?
                } else {
                    self.routine.remove_group(&target)?
                };
                if removed {
                    println!("✓ Removed {target} from routine");
                } else {
                    println!("Not in routine: {target}");
                }
            }
            RoutineAction::List => {
                let config = self.routine.load();
                if config.groups.is_empty() && config.projects.is_empty() {
                    println!("No routine configured.");
                    return Ok(());
                }
                if !config.groups.is_empty() {
                    println!("Groups:");
                    for group in &config.groups {
                        let count = self.registry.list_by_group(group).len();
                        println!("  • {group} ({count} projects)");
                    }
                }
                if !config.projects.is_empty() {
                    println!("Projects:");
                    for name in &config.projects {
                        println!("  • {name}");
                    }
                }
                let total = routine::routine_projects(&config, &self.registry).len();
                println!("\nTotal: {total} projects will be launched");
            }
            RoutineAction::Clear { force } => {
                if !force && !confirm("Clear all routine settings?")? {
                    println!("Cancelled.");
                    return Ok(());
                }
                self.routine.clear()?;
                println!("✓ Routine cleared");
            }
        }
        Ok(())
    }

    fn loop_config(&self, action: LoopAction) -> Result<()> {
        match action {
            LoopAction::Enable => {
                self.settings.set_loop_enabled(true)?;
                println!("✓ Return loop enabled");
            }
            LoopAction::Disable => {
                self.settings.set_loop_enabled(false)?;
                println!("✓ Return loop disabled");
            }
            LoopAction::Status => {
                let state = if self.settings.is_loop_enabled() {
                    "enabled"
                } else {
                    "disabled"
                };
                println!("Return loop is {state}");
            }
        }
        Ok(())
    }

    fn configure(
        &self,
        default_group: Option<String>,
        refresh_interval: Option<i64>,
        theme: Option<String>,
    ) -> Result<()> {
        if let Some(theme) = &theme {
            if !AVAILABLE_THEMES.contains(&theme.as_str()) {
                bail!(
                    "Unknown theme '{theme}' (available: {})",
                    AVAILABLE_THEMES.join(", ")
                );
            }
        }

        let settings = if default_group.is_none() && refresh_interval.is_none() && theme.is_none() {
            self.settings.load()
        } else {
            self.settings.update(|s| {
                if let Some(group) = default_group {
                    s.default_group = group;
                }
                if let Some(interval) = refresh_interval {
                    s.refresh_interval = interval;
                }
                if let Some(theme) = theme {
                    s.theme = theme;
                }
            })?
        };

        println!("loop_enabled:     {}", settings.loop_enabled);
        println!("default_group:    {}", settings.default_group);
        println!("refresh_interval: {}", settings.refresh_interval);
        println!("theme:            {}", settings.theme);
        Ok(())
    }

    fn migrate(&self) {
        println!("Migrating config files to project folders...");
        let results = template::migrate_all_configs(&self.paths, &self.registry);
        if results.is_empty() {
            println!("No configs to migrate.");
            return;
        }
        let migrated = results.iter().filter(|(_, moved)| *moved).count();
        for (name, moved) in &results {
            if *moved {
                println!("  ✓ {name}");
            } else {
                println!("  ○ {name} (already migrated or not found)");
            }
        }
        println!(
            "\nDone! Migrated: {migrated}, Skipped: {}",
            results.len() - migrated
        );
    }

    async fn switch_items(&self, zoxide_limit: Option<usize>) -> Vec<String> {
        let projects = self.registry.list_all();
        let zoxide = match zoxide_limit {
            Some(limit) => {
                let exclude: HashSet<PathBuf> = projects.iter().map(|p| p.path.clone()).collect();
                picker::query_zoxide(self.sessions.runner(), limit, &exclude).await
            }
            None => Vec::new(),
        };
        picker::build_switch_items(&projects, &zoxide)
    }

    /// Returns false when nothing was picked
    async fn switch(&mut self, zoxide_limit: Option<usize>) -> Result<bool> {
        let items = self.switch_items(zoxide_limit).await;
        if items.is_empty() {
            println!("No projects registered and zoxide has no entries.");
            println!("Use `kata add` to add a project.");
            return Ok(false);
        }
        match picker::run_fzf(&items, Some(SWITCH_HEADER)).await? {
            Some(selection) => self.switch_to_selection(&selection).await,
            None => Ok(false),
        }
    }

    async fn switch_to_selection(&mut self, selection: &str) -> Result<bool> {
        match picker::parse_selection(selection) {
            None => Ok(false),
            Some(SwitchTarget::Project(name)) => {
                let project = self.registry.get(&name)?.clone();
                self.launch_project(project).await?;
                Ok(true)
            }
            Some(SwitchTarget::Directory(dir)) => {
                self.sessions.launch_or_attach_adhoc(&dir).await?;
                Ok(true)
            }
        }
    }

    /// Run the switcher; with the return loop on, come back after each detach.
    async fn switcher_loop(&mut self) -> Result<()> {
        loop {
            let switched = self.switch(Some(DEFAULT_ZOXIDE_LIMIT)).await?;
            // switch-client returns at once inside tmux, so only loop on a real detach
            if !switched || self.sessions.is_inside_tmux() || !self.settings.is_loop_enabled() {
                return Ok(());
            }
        }
    }
}

fn status_label(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Active => "● active",
        SessionStatus::Detached => "○ detached",
        SessionStatus::Idle => "· idle",
    }
}

fn print_launch_results(results: &[LaunchResult]) {
    let (mut launched, mut skipped, mut failed) = (0, 0, 0);
    for result in results {
        match (result.success, result.skipped) {
            (true, true) => {
                println!("  ⏭ {} (already running)", result.project);
                skipped += 1;
            }
            (true, false) => {
                println!("  ✓ {}", result.project);
                launched += 1;
            }
            (false, _) => {
                println!(
                    "  ✗ {}: {}",
                    result.project,
                    result.error.as_deref().unwrap_or("unknown error")
                );
                failed += 1;
            }
        }
    }
    println!("\nDone! Launched: {launched}, Skipped: {skipped}, Failed: {failed}");
}

/// `$EDITOR`, `$VISUAL`, then the first of nano/vim/vi on PATH
pub fn editor_command() -> String {
    editor_from(|key| std::env::var(key).ok(), |bin| paths::find_in_path(bin).is_some())
}

fn editor_from(
    env: impl Fn(&str) -> Option<String>,
    installed: impl Fn(&str) -> bool,
) -> String {
    ["EDITOR", "VISUAL"]
        .iter()
        .find_map(|key| env(key).filter(|v| !v.trim().is_empty()))
        .or_else(|| {
            ["nano", "vim", "vi"]
                .iter()
                .find(|bin| installed(bin))
                .map(|bin| bin.to_string())
        })
        .unwrap_or_else(|| "vi".to_string())
}

fn prompt(message: &str) -> Result<String> {
    print!("{message}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn confirm(message: &str) -> Result<bool> {
    let answer = prompt(&format!("{message} [y/N]: "))?;
    Ok(matches!(answer.to_lowercase().as_str(), "y" | "yes"))
}

/// Parse `all`, `none` or `1,3,4` into zero-based indices. `None` means cancel.
fn parse_index_selection(input: &str, count: usize) -> Result<Option<Vec<usize>>> {
    let input = input.trim().to_lowercase();
    match input.as_str() {
        "" | "all" => return Ok(Some((0..count).collect())),
        "none" => return Ok(None),
        _ => {}
    }

    let mut selected = Vec::new();
    for part in input.split(',') {
        let n: usize = part
            .trim()
            .parse()
            .with_context(|| format!("Invalid selection: {part}"))?;
        if n == 0 || n > count {
            bail!("Invalid selection: {n} (expected 1-{count})");
        }
        if !selected.contains(&(n - 1)) {
            selected.push(n - 1);
        }
    }
    Ok(Some(selected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::DEFAULT_GROUP;
    use crate::tmux::fake::FakeRunner;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn app(runner: FakeRunner) -> (TempDir, App<FakeRunner>) {
        let dir = tempfile::tempdir().unwrap();
        let mut app = App::with_runner(KataPaths::new(dir.path().join("config")), runner);
        app.sessions = app
            .sessions
            .with_inside_tmux(true)
            .with_ready_poll(Duration::from_millis(1), 5);
        (dir, app)
    }

    fn project_dir(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::create_dir_all(&path).unwrap();
        path
    }

    #[tokio::test]
    async fn test_add_then_launch_by_shortcut() {
        let (dir, mut app) = app(FakeRunner::new());
        let path = project_dir(&dir, "api");
        fs::write(path.join("go.mod"), "module api\n").unwrap();

        app.handle_action(Some(Action::Add {
            path: Some(path),
            group: None,
            name: None,
            layout: None,
        }))
        .await
        .unwrap();
        let project = app.registry.get("api").unwrap();
        assert_eq!(project.group, DEFAULT_GROUP);
        assert!(template::template_exists(project));

        app.handle_action(Some(Action::Shortcut {
            name: "api".to_string(),
            digit: Some(3),
        }))
        .await
        .unwrap();
        app.handle_action(Some(Action::Launch {
            target: "3".to_string(),
        }))
        .await
        .unwrap();

        assert_eq!(app.sessions.runner().count("tmuxp"), 1);
        assert_eq!(app.registry.get("api").unwrap().times_opened, 1);
        assert_eq!(app.sessions.get_session_status("api").await, SessionStatus::Active);
    }

    #[tokio::test]
    async fn test_add_keeps_existing_layout() {
        let (dir, mut app) = app(FakeRunner::new());
        let path = project_dir(&dir, "web");
        fs::write(path.join(paths::PROJECT_CONFIG_FILE), "session_name: web\nstart_directory: .\n").unwrap();

        app.handle_action(Some(Action::Add {
            path: Some(path.clone()),
            group: Some("Work".to_string()),
            name: None,
            layout: Some(LayoutPreset::Full),
        }))
        .await
        .unwrap();

        let raw = fs::read_to_string(path.join(paths::PROJECT_CONFIG_FILE)).unwrap();
        assert_eq!(raw, "session_name: web\nstart_directory: .\n");
        assert_eq!(app.registry.get("web").unwrap().group, "Work");
    }

    #[tokio::test]
    async fn test_rename_then_launch_uses_new_name() {
        let (dir, mut app) = app(FakeRunner::new());
        let path = project_dir(&dir, "api");

        app.handle_action(Some(Action::Add {
            path: Some(path.clone()),
            group: None,
            name: None,
            layout: None,
        }))
        .await
        .unwrap();
        app.handle_action(Some(Action::Rename {
            name: "api".to_string(),
            new_name: "alpha".to_string(),
        }))
        .await
        .unwrap();
        let project = app.registry.get("alpha").unwrap().clone();
        assert_eq!(template::read_template(&project).unwrap().session_name, "alpha");

        app.handle_action(Some(Action::Launch {
            target: "alpha".to_string(),
        }))
        .await
        .unwrap();
        assert_eq!(app.sessions.runner().sessions(), vec!["alpha".to_string()]);
    }

    #[tokio::test]
    async fn test_add_over_foreign_layout_launches_registered_name() {
        let (dir, mut app) = app(FakeRunner::new());
        let first = project_dir(&dir, "x");
        let second = dir.path().join("other").join("x");
        fs::create_dir_all(&second).unwrap();
        fs::write(second.join(paths::PROJECT_CONFIG_FILE), "session_name: x\nstart_directory: .\n").unwrap();

        for path in [first, second.clone()] {
            app.handle_action(Some(Action::Add {
                path: Some(path),
                group: None,
                name: None,
                layout: None,
            }))
            .await
            .unwrap();
        }
        let project = app.registry.get("x-1").unwrap().clone();
        assert_eq!(template::read_template(&project).unwrap().session_name, "x-1");

        app.handle_action(Some(Action::Launch {
            target: "x-1".to_string(),
        }))
        .await
        .unwrap();
        assert_eq!(app.sessions.runner().sessions(), vec!["x-1".to_string()]);
        assert_eq!(app.sessions.get_session_status("x").await, SessionStatus::Idle);
    }

    #[tokio::test]
    async fn test_add_with_name_over_existing_layout() {
        let (dir, mut app) = app(FakeRunner::new());
        let path = project_dir(&dir, "web");
        fs::write(path.join(paths::PROJECT_CONFIG_FILE), "session_name: web\nstart_directory: /srv/web\n").unwrap();

        app.handle_action(Some(Action::Add {
            path: Some(path.clone()),
            group: None,
            name: Some("frontend".to_string()),
            layout: None,
        }))
        .await
        .unwrap();
        let raw = fs::read_to_string(path.join(paths::PROJECT_CONFIG_FILE)).unwrap();
        assert!(raw.contains("session_name: frontend"));
        assert!(raw.contains("start_directory: /srv/web"));

        app.handle_action(Some(Action::Launch {
            target: "frontend".to_string(),
        }))
        .await
        .unwrap();
        assert_eq!(app.sessions.runner().sessions(), vec!["frontend".to_string()]);
    }

    #[tokio::test]
    async fn test_kill_all_spares_unregistered_sessions() {
        let (dir, mut app) = app(FakeRunner::with_sessions(&[("api", 1), ("scratch", 0)]));
        app.registry
            .add(Project::new("api", project_dir(&dir, "api"), DEFAULT_GROUP))
            .unwrap();

        app.handle_action(Some(Action::Kill {
            name: None,
            all: true,
            force: true,
        }))
        .await
        .unwrap();
        assert_eq!(app.sessions.runner().sessions(), ["scratch"]);
    }

    #[tokio::test]
    async fn test_unknown_targets_fail() {
        let (_dir, mut app) = app(FakeRunner::new());
        let routine_add = Action::Routine {
            action: Some(RoutineAction::Add {
                target: "ghost".to_string(),
                project: true,
            }),
        };
        assert!(app.handle_action(Some(routine_add)).await.is_err());
        assert!(app
            .handle_action(Some(Action::Launch {
                target: "ghost".to_string()
            }))
            .await
            .is_err());
        assert!(app
            .handle_action(Some(Action::Settings {
                default_group: None,
                refresh_interval: None,
                theme: Some("solarized".to_string()),
            }))
            .await
            .is_err());
    }

    #[test]
    fn test_parse_index_selection() {
        assert_eq!(parse_index_selection("", 3).unwrap(), Some(vec![0, 1, 2]));
        assert_eq!(parse_index_selection("ALL", 2).unwrap(), Some(vec![0, 1]));
        assert_eq!(parse_index_selection("none", 2).unwrap(), None);
        assert_eq!(parse_index_selection("3, 1,3", 3).unwrap(), Some(vec![2, 0]));
        assert!(parse_index_selection("0", 3).is_err());
        assert!(parse_index_selection("4", 3).is_err());
        assert!(parse_index_selection("x", 3).is_err());
    }

    #[test]
    fn test_editor_chain() {
        let env = |key: &str| (key == "VISUAL").then(|| "hx".to_string());
        assert_eq!(editor_from(env, |_| true), "hx");
        assert_eq!(editor_from(|_| None, |bin| bin == "vim"), "vim");
        assert_eq!(editor_from(|_| Some(" ".to_string()), |_| false), "vi");
    }
}
