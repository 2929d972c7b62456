use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

use crate::paths::KataPaths;
use crate::project::DEFAULT_GROUP;
use crate::store::{self, StoreError};

pub const DEFAULT_THEME: &str = "kata-dark";
pub const AVAILABLE_THEMES: [&str; 6] = [
    "kata-dark",
    "kata-light",
    "kata-ocean",
    "kata-warm",
    "kata-glass",
    "kata-glass-light",
];
pub const REFRESH_INTERVAL_RANGE: std::ops::RangeInclusive<i64> = 1..=60;
const DEFAULT_REFRESH_INTERVAL: i64 = 5;

/// Global preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Re-run the switcher after detaching from a session
    pub loop_enabled: bool,
    pub default_group: String,
    /// Dashboard refresh interval in seconds
    #[serde(deserialize_with = "lenient_interval")]
    pub refresh_interval: i64,
    pub theme: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            loop_enabled: false,
            default_group: DEFAULT_GROUP.to_string(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            theme: DEFAULT_THEME.to_string(),
        }
    }
}

/// Accept any JSON number for the interval; clamping happens in `validated`
fn lenient_interval<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    let value = f64::deserialize(d)?;
    Ok(value.round() as i64)
}

impl Settings {
    /// Clamp numeric fields and replace unknown themes.
    pub fn validated(mut self) -> Self {
        self.refresh_interval = self.refresh_interval.clamp(
            *REFRESH_INTERVAL_RANGE.start(),
            *REFRESH_INTERVAL_RANGE.end(),
        );
        if !AVAILABLE_THEMES.contains(&self.theme.as_str()) {
            self.theme = DEFAULT_THEME.to_string();
        }
        if self.default_group.trim().is_empty() {
            self.default_group = DEFAULT_GROUP.to_string();
        }
        self
    }
}

#[derive(Debug, Deserialize)]
struct LegacyLoopConfig {
    #[serde(default)]
    enabled: bool,
}

/// Loads and saves `settings.json`
#[derive(Debug, Clone)]
pub struct SettingsStore {
    file: PathBuf,
    legacy_file: PathBuf,
}

impl SettingsStore {
    pub fn new(paths: &KataPaths) -> Self {
        Self {
            file: paths.settings_file(),
            legacy_file: paths.legacy_loop_file(),
        }
    }

    /// Load settings. Never fails: a missing file falls back to the legacy
    /// loop config (migrating it), then to defaults; a corrupt file falls
    /// back to defaults.
    pub fn load(&self) -> Settings {
        match store::read_json::<Settings>(&self.file) {
            Ok(Some(settings)) => settings.validated(),
            Ok(None) => self.migrate_legacy().unwrap_or_default(),
            Err(e) => {
                tracing::warn!("{e}; using default settings");
                Settings::default()
            }
        }
    }

    fn migrate_legacy(&self) -> Option<Settings> {
        let legacy = match store::read_json::<LegacyLoopConfig>(&self.legacy_file) {
            Ok(Some(legacy)) => legacy,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("failed to migrate legacy loop config: {e}");
                return None;
            }
        };

        let settings = Settings {
            loop_enabled: legacy.enabled,
            ..Settings::default()
        };
        tracing::debug!("migrated loop_enabled={} from legacy config", legacy.enabled);
        if let Err(e) = self.save(&settings) {
            tracing::warn!("failed to persist migrated settings: {e}");
        }
        Some(settings)
    }

    pub fn save(&self, settings: &Settings) -> Result<(), StoreError> {
        store::write_json(&self.file, settings)
    }

    /// Apply `change`, re-validate, persist, and return the new settings.
    pub fn update(&self, change: impl FnOnce(&mut Settings)) -> Result<Settings, StoreError> {
        let mut settings = self.load();
        change(&mut settings);
        let settings = settings.validated();
        self.save(&settings)?;
        Ok(settings)
    }

    pub fn is_loop_enabled(&self) -> bool {
        self.load().loop_enabled
    }

    pub fn set_loop_enabled(&self, enabled: bool) -> Result<(), StoreError> {
        self.update(|s| s.loop_enabled = enabled).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, KataPaths, SettingsStore) {
        let dir = tempfile::tempdir().unwrap();
        let paths = KataPaths::new(dir.path());
        let store = SettingsStore::new(&paths);
        (dir, paths, store)
    }

    #[test]
    fn test_defaults_when_missing() {
        let (_dir, paths, store) = setup();
        assert_eq!(store.load(), Settings::default());
        assert!(!paths.settings_file().exists());
    }

    #[test]
    fn test_save_and_load() {
        let (_dir, _paths, store) = setup();
        let settings = Settings {
            loop_enabled: true,
            default_group: "Work".to_string(),
            refresh_interval: 10,
            theme: "kata-ocean".to_string(),
        };
        store.save(&settings).unwrap();
        assert_eq!(store.load(), settings);
    }

    #[test]
    fn test_values_are_clamped_on_load() {
        let (_dir, paths, store) = setup();
        fs::create_dir_all(paths.root()).unwrap();
        fs::write(
            paths.settings_file(),
            r#"{"refresh_interval": 500, "theme": "monokai"}"#,
        )
        .unwrap();

        let settings = store.load();
        assert_eq!(settings.refresh_interval, 60);
        assert_eq!(settings.theme, DEFAULT_THEME);
        assert_eq!(settings.default_group, DEFAULT_GROUP);

        fs::write(paths.settings_file(), r#"{"refresh_interval": -3}"#).unwrap();
        assert_eq!(store.load().refresh_interval, 1);
    }

    #[test]
    fn test_update_clamps_and_persists() {
        let (_dir, _paths, store) = setup();
        let updated = store.update(|s| s.refresh_interval = 0).unwrap();
        assert_eq!(updated.refresh_interval, 1);
        assert_eq!(store.load().refresh_interval, 1);
    }

    #[test]
    fn test_corrupt_file_uses_defaults() {
        let (_dir, paths, store) = setup();
        fs::create_dir_all(paths.root()).unwrap();
        fs::write(paths.settings_file(), "{{{").unwrap();
        assert_eq!(store.load(), Settings::default());
    }

    #[test]
    fn test_migrates_legacy_loop_config() {
        let (_dir, paths, store) = setup();
        fs::create_dir_all(paths.root()).unwrap();
        fs::write(paths.legacy_loop_file(), r#"{"enabled": true}"#).unwrap();

        assert!(store.load().loop_enabled);
        assert!(paths.settings_file().exists());
    }

    #[test]
    fn test_loop_toggle() {
        let (_dir, _paths, store) = setup();
        assert!(!store.is_loop_enabled());
        store.set_loop_enabled(true).unwrap();
        assert!(store.is_loop_enabled());
        store.set_loop_enabled(false).unwrap();
        assert!(!store.is_loop_enabled());
    }
}
