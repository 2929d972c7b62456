//! The project registry: every registered project, keyed by unique name,
//! persisted as one JSON document that is rewritten on each mutation.
//!
//! There is no cross-process locking. Two kata processes mutating the
//! registry at once race, and the last writer wins.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::paths::{is_valid_session_name, normalize_path};
use crate::project::{config_filename, Project};
use crate::store::{self, StoreError};

const REGISTRY_VERSION: &str = "1.0";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Project already exists at path: {}", .0.display())]
    DuplicatePath(PathBuf),
    #[error("Project not found: {0}")]
    ProjectNotFound(String),
    #[error("Project name already taken: {0}")]
    NameTaken(String),
    #[error("Invalid project name '{0}': names cannot be empty or contain '.' or ':'")]
    InvalidName(String),
    #[error("Shortcut must be between 1 and 9, got {0}")]
    InvalidShortcut(u8),
    #[error("Shortcut {shortcut} is already assigned to {owner}")]
    ShortcutTaken { shortcut: u8, owner: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Serialize, Deserialize)]
struct RegistryFile {
    version: String,
    #[serde(default)]
    projects: Vec<Project>,
}

impl Default for RegistryFile {
    fn default() -> Self {
        Self {
            version: REGISTRY_VERSION.to_string(),
            projects: Vec::new(),
        }
    }
}

/// Persistent collection of projects
#[derive(Debug)]
pub struct Registry {
    file: PathBuf,
    projects: HashMap<String, Project>,
    /// Insertion order, for stable listings
    order: Vec<String>,
}

impl Registry {
    /// Load the registry from `file`.
    ///
    /// A missing file is an empty registry. A corrupt or unreadable file is
    /// also treated as empty; it stays on disk until the next save replaces it.
    pub fn open(file: impl Into<PathBuf>) -> Self {
        let file = file.into();
        let doc: RegistryFile = store::read_json_or_default(&file);

        let mut registry = Self {
            file,
            projects: HashMap::new(),
            order: Vec::new(),
        };
        for project in doc.projects {
            registry.insert(project.normalize());
        }
        registry
    }

    fn insert(&mut self, project: Project) {
        if !self.projects.contains_key(&project.name) {
            self.order.push(project.name.clone());
        }
        self.projects.insert(project.name.clone(), project);
    }

    fn save(&self) -> Result<(), RegistryError> {
        let doc = RegistryFile {
            version: REGISTRY_VERSION.to_string(),
            projects: self.list_all().into_iter().cloned().collect(),
        };
        store::write_json(&self.file, &doc)?;
        Ok(())
    }

    /// Add a project.
    ///
    /// Fails if another project already points at the same resolved path.
    /// A name collision is resolved by renaming the incoming project to
    /// `name-1`, `name-2`, ... Returns the stored project.
    pub fn add(&mut self, mut project: Project) -> Result<Project, RegistryError> {
        let path = normalize_path(&project.path);
        if self.find_by_path(&path).is_some() {
            return Err(RegistryError::DuplicatePath(path));
        }
        if !is_valid_session_name(&project.name) {
            return Err(RegistryError::InvalidName(project.name));
        }

        project.path = path;
        if self.contains(&project.name) {
            let base = project.name.clone();
            let mut counter = 1;
            while self.contains(&format!("{base}-{counter}")) {
                counter += 1;
            }
            project.name = format!("{base}-{counter}");
            project.config = config_filename(&project.name);
        }

        self.insert(project.clone());
        self.save()?;
        Ok(project)
    }

    /// Remove a project. The project directory and its layout file are left alone.
    pub fn remove(&mut self, name: &str) -> Result<Project, RegistryError> {
        let project = self
            .projects
            .remove(name)
            .ok_or_else(|| RegistryError::ProjectNotFound(name.to_string()))?;
        self.order.retain(|n| n != name);
        self.save()?;
        Ok(project)
    }

    pub fn get(&self, name: &str) -> Result<&Project, RegistryError> {
        self.projects
            .get(name)
            .ok_or_else(|| RegistryError::ProjectNotFound(name.to_string()))
    }

    /// Replace a stored project wholesale.
    pub fn update(&mut self, project: Project) -> Result<(), RegistryError> {
        if !self.contains(&project.name) {
            return Err(RegistryError::ProjectNotFound(project.name));
        }
        self.insert(project);
        self.save()
    }

    /// Rename a project, keeping its position in listings.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<Project, RegistryError> {
        if !self.contains(old) {
            return Err(RegistryError::ProjectNotFound(old.to_string()));
        }
        if !is_valid_session_name(new) {
            return Err(RegistryError::InvalidName(new.to_string()));
        }
        if old == new {
            return Ok(self.projects[old].clone());
        }
        if self.contains(new) {
            return Err(RegistryError::NameTaken(new.to_string()));
        }

        let mut project = self
            .projects
            .remove(old)
            .ok_or_else(|| RegistryError::ProjectNotFound(old.to_string()))?;
        project.name = new.to_string();
        project.config = config_filename(new);

        for slot in self.order.iter_mut().filter(|n| n.as_str() == old) {
            *slot = new.to_string();
        }
        self.projects.insert(new.to_string(), project.clone());
        self.save()?;
        Ok(project)
    }

    /// Assign (or clear, with `None`) a quick launch shortcut.
    pub fn set_shortcut(&mut self, name: &str, shortcut: Option<u8>) -> Result<(), RegistryError> {
        if let Some(slot) = shortcut {
            if !(1..=9).contains(&slot) {
                return Err(RegistryError::InvalidShortcut(slot));
            }
            if let Some(owner) = self.find_by_shortcut(slot) {
                if owner.name != name {
                    return Err(RegistryError::ShortcutTaken {
                        shortcut: slot,
                        owner: owner.name.clone(),
                    });
                }
            }
        }

        let mut project = self.get(name)?.clone();
        project.shortcut = shortcut;
        self.update(project)
    }

    pub fn list_all(&self) -> Vec<&Project> {
        self.order
            .iter()
            .filter_map(|name| self.projects.get(name))
            .collect()
    }

    pub fn list_by_group(&self, group: &str) -> Vec<&Project> {
        self.list_all()
            .into_iter()
            .filter(|p| p.group == group)
            .collect()
    }

    /// Sorted, de-duplicated group names
    pub fn groups(&self) -> Vec<String> {
        self.projects
            .values()
            .map(|p| p.group.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn find_by_path(&self, path: impl AsRef<Path>) -> Option<&Project> {
        let wanted = normalize_path(path);
        self.list_all()
            .into_iter()
            .find(|p| normalize_path(&p.path) == wanted)
    }

    pub fn find_by_shortcut(&self, shortcut: u8) -> Option<&Project> {
        self.list_all()
            .into_iter()
            .find(|p| p.shortcut == Some(shortcut))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.projects.contains_key(name)
    }
}

#[cfg(test)]
impl Registry {
    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::DEFAULT_GROUP;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Registry) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(dir.path().join("registry.json"));
        (dir, registry)
    }

    fn project_dir(root: &Path, rel: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(&path).unwrap();
        path
    }

    #[test]
    fn test_add_project() {
        let (dir, mut registry) = setup();
        let path = project_dir(dir.path(), "x");

        let stored = registry.add(Project::from_path(&path, DEFAULT_GROUP)).unwrap();

        assert_eq!(stored.name, "x");
        assert_eq!(registry.len(), 1);
        let raw = fs::read_to_string(registry.file()).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc["version"], "1.0");
        assert_eq!(doc["projects"].as_array().unwrap().len(), 1);
        assert_eq!(doc["projects"][0]["name"], "x");
    }

    #[test]
    fn test_add_duplicate_path_fails_without_mutation() {
        let (dir, mut registry) = setup();
        let path = project_dir(dir.path(), "x");

        registry.add(Project::from_path(&path, DEFAULT_GROUP)).unwrap();
        let before = fs::read_to_string(registry.file()).unwrap();

        let err = registry
            .add(Project::from_path(&path, "Other"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicatePath(_)));
        assert_eq!(registry.len(), 1);
        assert_eq!(fs::read_to_string(registry.file()).unwrap(), before);
    }

    #[cfg(unix)]
    #[test]
    fn test_duplicate_path_through_symlink() {
        let (dir, mut registry) = setup();
        let path = project_dir(dir.path(), "real");
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&path, &link).unwrap();

        registry.add(Project::from_path(&path, DEFAULT_GROUP)).unwrap();
        let err = registry
            .add(Project::new("link", &link, DEFAULT_GROUP))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicatePath(_)));
    }

    #[test]
    fn test_name_collision_picks_smallest_suffix() {
        let (dir, mut registry) = setup();
        let a = project_dir(dir.path(), "a/x");
        let b = project_dir(dir.path(), "b/x");
        let c = project_dir(dir.path(), "c/x");

        registry.add(Project::from_path(&a, DEFAULT_GROUP)).unwrap();
        let second = registry.add(Project::from_path(&b, DEFAULT_GROUP)).unwrap();
        assert_eq!(second.name, "x-1");
        assert_eq!(second.config, "x-1.yaml");
        assert_eq!(registry.len(), 2);

        let third = registry.add(Project::from_path(&c, DEFAULT_GROUP)).unwrap();
        assert_eq!(third.name, "x-2");

        let names: Vec<_> = registry.list_all().iter().map(|p| p.name.clone()).collect();
        assert_eq!(names, vec!["x", "x-1", "x-2"]);
    }

    #[test]
    fn test_collision_reuses_freed_suffix() {
        let (dir, mut registry) = setup();
        for rel in ["a/x", "b/x", "c/x"] {
            let path = project_dir(dir.path(), rel);
            registry.add(Project::from_path(&path, DEFAULT_GROUP)).unwrap();
        }
        registry.remove("x-1").unwrap();

        let path = project_dir(dir.path(), "d/x");
        let stored = registry.add(Project::from_path(&path, DEFAULT_GROUP)).unwrap();
        assert_eq!(stored.name, "x-1");
    }

    #[test]
    fn test_get_roundtrip_matches_added() {
        let (dir, mut registry) = setup();
        let path = project_dir(dir.path(), "api");
        let mut project = Project::from_path(&path, "Work");
        project.shortcut = Some(2);

        let stored = registry.add(project.clone()).unwrap();
        assert_eq!(registry.get(&stored.name).unwrap(), &project);
    }

    #[test]
    fn test_remove_project() {
        let (dir, mut registry) = setup();
        let path = project_dir(dir.path(), "x");
        registry.add(Project::from_path(&path, DEFAULT_GROUP)).unwrap();

        let removed = registry.remove("x").unwrap();
        assert_eq!(removed.name, "x");
        assert!(registry.is_empty());
        assert!(path.exists());
        assert!(matches!(
            registry.remove("x"),
            Err(RegistryError::ProjectNotFound(_))
        ));
    }

    #[test]
    fn test_get_and_update_missing() {
        let (dir, mut registry) = setup();
        assert!(matches!(
            registry.get("ghost"),
            Err(RegistryError::ProjectNotFound(_))
        ));
        let project = Project::from_path(dir.path().join("ghost"), DEFAULT_GROUP);
        assert!(matches!(
            registry.update(project),
            Err(RegistryError::ProjectNotFound(_))
        ));
    }

    #[test]
    fn test_update_persists() {
        let (dir, mut registry) = setup();
        let path = project_dir(dir.path(), "x");
        registry.add(Project::from_path(&path, DEFAULT_GROUP)).unwrap();

        let mut project = registry.get("x").unwrap().clone();
        project.group = "Work".to_string();
        project.record_open();
        registry.update(project).unwrap();

        let reopened = Registry::open(registry.file());
        let project = reopened.get("x").unwrap();
        assert_eq!(project.group, "Work");
        assert_eq!(project.times_opened, 1);
    }

    #[test]
    fn test_groups_and_listing() {
        let (dir, mut registry) = setup();
        for (rel, group) in [("a", "Work"), ("b", "Personal"), ("c", "Work")] {
            let path = project_dir(dir.path(), rel);
            registry.add(Project::from_path(&path, group)).unwrap();
        }

        assert_eq!(registry.groups(), vec!["Personal", "Work"]);
        let work: Vec<_> = registry
            .list_by_group("Work")
            .iter()
            .map(|p| p.name.clone())
            .collect();
        assert_eq!(work, vec!["a", "c"]);
        assert!(registry.list_by_group("Nope").is_empty());
    }

    #[test]
    fn test_find_by_path() {
        let (dir, mut registry) = setup();
        let path = project_dir(dir.path(), "x");
        registry.add(Project::from_path(&path, DEFAULT_GROUP)).unwrap();

        let found = registry.find_by_path(path.join("..").join("x")).unwrap();
        assert_eq!(found.name, "x");
        assert!(registry.find_by_path(dir.path().join("other")).is_none());
    }

    #[test]
    fn test_rename() {
        let (dir, mut registry) = setup();
        for rel in ["a", "b"] {
            let path = project_dir(dir.path(), rel);
            registry.add(Project::from_path(&path, DEFAULT_GROUP)).unwrap();
        }

        let renamed = registry.rename("a", "alpha").unwrap();
        assert_eq!(renamed.config, "alpha.yaml");
        assert!(!registry.contains("a"));
        assert!(matches!(
            registry.rename("alpha", "b"),
            Err(RegistryError::NameTaken(_))
        ));
        assert!(matches!(
            registry.rename("alpha", "al.pha"),
            Err(RegistryError::InvalidName(_))
        ));

        let names: Vec<_> = Registry::open(registry.file())
            .list_all()
            .iter()
            .map(|p| p.name.clone())
            .collect();
        assert_eq!(names, vec!["alpha", "b"]);
    }

    #[test]
    fn test_shortcuts_are_unique() {
        let (dir, mut registry) = setup();
        for rel in ["a", "b"] {
            let path = project_dir(dir.path(), rel);
            registry.add(Project::from_path(&path, DEFAULT_GROUP)).unwrap();
        }

        registry.set_shortcut("a", Some(1)).unwrap();
        assert!(matches!(
            registry.set_shortcut("b", Some(1)),
            Err(RegistryError::ShortcutTaken { shortcut: 1, .. })
        ));
        assert!(matches!(
            registry.set_shortcut("b", Some(10)),
            Err(RegistryError::InvalidShortcut(10))
        ));
        // Reassigning the same slot to its owner is fine
        registry.set_shortcut("a", Some(1)).unwrap();
        assert_eq!(registry.find_by_shortcut(1).unwrap().name, "a");

        registry.set_shortcut("a", None).unwrap();
        registry.set_shortcut("b", Some(1)).unwrap();
        assert_eq!(registry.find_by_shortcut(1).unwrap().name, "b");
    }

    #[test]
    fn test_missing_and_corrupt_files_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("registry.json");
        assert!(Registry::open(&file).is_empty());

        fs::write(&file, "{\"projects\": [oops").unwrap();
        let mut registry = Registry::open(&file);
        assert!(registry.is_empty());
        // The corrupt file survives until the next successful write
        assert!(fs::read_to_string(&file).unwrap().contains("oops"));

        let path = project_dir(dir.path(), "x");
        registry.add(Project::from_path(&path, DEFAULT_GROUP)).unwrap();
        assert_eq!(Registry::open(&file).len(), 1);
    }
}
