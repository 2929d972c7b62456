use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::paths::{normalize_path, session_name_from_path};

pub const DEFAULT_GROUP: &str = "Uncategorized";

/// A registered project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Unique key, doubles as the tmux session name
    pub name: String,
    /// Absolute, resolved project root
    pub path: PathBuf,
    #[serde(default = "default_group")]
    pub group: String,
    /// Layout filename, `<name>.yaml` unless set otherwise
    #[serde(default)]
    pub config: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    pub last_opened: Option<DateTime<Utc>>,
    #[serde(default)]
    pub times_opened: u64,
    /// Quick launch slot 1-9, unique across the registry when set
    #[serde(default)]
    pub shortcut: Option<u8>,
}

fn default_group() -> String {
    DEFAULT_GROUP.to_string()
}

pub fn config_filename(name: &str) -> String {
    format!("{name}.yaml")
}

impl Project {
    pub fn new(name: impl Into<String>, path: impl AsRef<Path>, group: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            config: config_filename(&name),
            name,
            path: normalize_path(path),
            group: group.into(),
            created_at: Utc::now(),
            last_opened: None,
            times_opened: 0,
            shortcut: None,
        }
    }

    /// Build a project whose name is derived from the directory basename
    pub fn from_path(path: impl AsRef<Path>, group: impl Into<String>) -> Self {
        let name = session_name_from_path(path.as_ref());
        Self::new(name, path, group)
    }

    /// Record that the project was opened.
    pub fn record_open(&mut self) {
        self.last_opened = Some(Utc::now());
        self.times_opened += 1;
    }

    /// Fill in fields older registry files may have left blank
    pub(crate) fn normalize(mut self) -> Self {
        if self.config.is_empty() {
            self.config = config_filename(&self.name);
        }
        self.path = normalize_path(&self.path);
        self
    }
}

/// RFC 3339 timestamps, also accepting naive local timestamps from older files
mod timestamp {
    use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}")))
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(dt) => super::serialize(dt, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(d)? {
                Some(raw) => parse(&raw)
                    .map(Some)
                    .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}"))),
                None => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_path_derives_name_and_config() {
        let project = Project::from_path("/tmp/kata-test/webapp", DEFAULT_GROUP);
        assert_eq!(project.name, "webapp");
        assert_eq!(project.config, "webapp.yaml");
        assert_eq!(project.group, "Uncategorized");
        assert!(project.path.is_absolute());
        assert_eq!(project.times_opened, 0);
        assert!(project.last_opened.is_none());
    }

    #[test]
    fn test_record_open() {
        let mut project = Project::from_path("/tmp/kata-test/api", "Work");
        let created = project.created_at;
        project.record_open();
        project.record_open();
        assert_eq!(project.times_opened, 2);
        assert!(project.last_opened.is_some());
        assert_eq!(project.created_at, created);
    }

    #[test]
    fn test_serde_roundtrip_preserves_fields() {
        let mut project = Project::from_path("/tmp/kata-test/api", "Work");
        project.record_open();
        project.shortcut = Some(3);

        let raw = serde_json::to_string(&project).unwrap();
        assert!(raw.contains("\"created_at\""));
        assert!(raw.contains("\"times_opened\":1"));
        let decoded: Project = serde_json::from_str(&raw).unwrap();
        assert_eq!(decoded, project);
    }

    #[test]
    fn test_legacy_record_defaults() {
        let raw = r#"{
            "name": "old",
            "path": "/tmp/kata-test/old",
            "created_at": "2024-03-01T09:30:00.123456",
            "last_opened": null
        }"#;
        let project: Project = serde_json::from_str(raw).unwrap();
        let project = project.normalize();
        assert_eq!(project.group, "Uncategorized");
        assert_eq!(project.config, "old.yaml");
        assert_eq!(project.times_opened, 0);
        assert!(project.shortcut.is_none());
    }
}
