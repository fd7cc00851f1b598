//! Configuration persistence
//!
//! Stored as JSON in ~/.config/m3u-bridge/config.json, or
//! config_<profile>.json for a named profile. Keys missing from the file take
//! their default value, so older files keep loading after new settings appear.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::conflict::ResolutionStrategy;
use crate::device::{Device, DevicePair, Side};

const APP_DIR: &str = "m3u-bridge";
const CONFIG_VERSION: u32 = 1;

/// Settings that drive a single sync run; may be reloaded between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Minimum seconds between two processings of the same playlist
    pub delay_secs: f64,
    /// Seconds during which events for a file we just wrote are ignored
    pub block_duration_secs: f64,
    /// Backups kept per playlist
    pub max_backups: usize,
    pub conflict_resolution: ResolutionStrategy,
    pub auto_resolve_conflicts: bool,
    /// Snapshot both versions before a resolution overwrites them
    pub backup_before_resolve: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            delay_secs: 1.0,
            block_duration_secs: 2.0,
            max_backups: 5,
            conflict_resolution: ResolutionStrategy::default(),
            auto_resolve_conflicts: true,
            backup_before_resolve: true,
        }
    }
}

impl SyncConfig {
    pub fn delay(&self) -> Duration {
        seconds(self.delay_secs)
    }

    pub fn block_duration(&self) -> Duration {
        seconds(self.block_duration_secs)
    }
}

fn seconds(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

/// One device folder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Name used in generated headers
    pub label: String,
    pub folder: PathBuf,
    /// Short tag used in conflict snapshot names
    pub snapshot_tag: String,
}

impl DeviceSettings {
    fn new(label: &str, snapshot_tag: &str) -> Self {
        Self {
            label: label.to_string(),
            folder: PathBuf::new(),
            snapshot_tag: snapshot_tag.to_string(),
        }
    }
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self::new("Device", "DEVICE")
    }
}

/// Everything persisted between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Config format version
    pub version: u32,
    pub device_a: DeviceSettings,
    pub device_b: DeviceSettings,
    /// Root of the Conversion, Backups and Conflicts folders
    pub data_dir: Option<PathBuf>,
    pub sync: SyncConfig,
    /// e.g. "30min", "hourly", "daily@02:00", "never"
    pub schedule_interval: String,
    /// Per-playlist strategy overrides
    pub conflict_rules: BTreeMap<String, ResolutionStrategy>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            device_a: DeviceSettings::new("PC", "PC"),
            device_b: DeviceSettings::new("Smartphone", "PHONE"),
            data_dir: None,
            sync: SyncConfig::default(),
            schedule_interval: "30min".to_string(),
            conflict_rules: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    /// Load the config for a profile, `None` when it has never been saved
    pub fn load(profile: Option<&str>) -> Result<Option<Self>> {
        Self::load_from(&Self::config_path(profile)?)
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            debug!("No config found at {}", path.display());
            return Ok(None);
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config {:?}", path))?;

        debug!("Loaded config from {}", path.display());
        Ok(Some(config))
    }

    /// Save the config for a profile, returning where it was written
    pub fn save(&self, profile: Option<&str>) -> Result<PathBuf> {
        let path = Self::config_path(profile)?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }

        let contents =
            serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config to {:?}", path))?;

        debug!("Saved config to {}", path.display());
        Ok(())
    }

    /// Config file path for a profile
    pub fn config_path(profile: Option<&str>) -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        let file_name = match profile {
            None | Some("default") => "config.json".to_string(),
            Some(name) => format!("config_{}.json", name),
        };
        Ok(config_dir.join(APP_DIR).join(file_name))
    }

    /// Check that both device folders are configured and differ and that
    /// timings are sane.
    ///
    /// A folder missing right now (an unmounted device) is only logged; the
    /// sync skips that side.
    pub fn validate(&self) -> Result<()> {
        for device in [&self.device_a, &self.device_b] {
            if device.folder.as_os_str().is_empty() {
                bail!("No folder configured for {}", device.label);
            }
            if !device.folder.is_dir() {
                warn!(
                    "Folder for {} is not available: {}",
                    device.label,
                    device.folder.display()
                );
            }
        }

        if self.device_a.folder == self.device_b.folder {
            bail!("Both devices point at the same folder");
        }

        for (name, value) in [
            ("delay_secs", self.sync.delay_secs),
            ("block_duration_secs", self.sync.block_duration_secs),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("{} must be a non-negative number, got {}", name, value);
            }
        }

        Ok(())
    }

    /// Stricter check for setup: both folders must exist now
    pub fn require_folders(&self) -> Result<()> {
        for device in [&self.device_a, &self.device_b] {
            if !device.folder.is_dir() {
                bail!(
                    "Folder for {} does not exist: {}",
                    device.label,
                    device.folder.display()
                );
            }
        }
        Ok(())
    }

    pub fn devices(&self) -> DevicePair {
        let build = |side, settings: &DeviceSettings| {
            Device::new(
                side,
                settings.label.clone(),
                settings.folder.clone(),
                settings.snapshot_tag.clone(),
            )
        };
        DevicePair::new(build(Side::A, &self.device_a), build(Side::B, &self.device_b))
    }

    pub fn data_layout(&self) -> Result<DataLayout> {
        let root = match &self.data_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?
                .join(APP_DIR),
        };
        Ok(DataLayout::under(&root))
    }
}

/// Folders the engine keeps its own files in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    /// Last reconciled version of every playlist ("Conversion")
    pub staging: PathBuf,
    pub backups: PathBuf,
    /// Pre-resolution snapshots
    pub conflicts: PathBuf,
}

impl DataLayout {
    pub fn under(root: &Path) -> Self {
        Self {
            staging: root.join("Conversion"),
            backups: root.join("Backups"),
            conflicts: root.join("Conflicts"),
        }
    }

    /// Create the folders if needed
    pub async fn ensure(&self) -> Result<()> {
        for dir in [&self.staging, &self.backups, &self.conflicts] {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create {:?}", dir))?;
        }
        debug!("Data folders ready under {}", self.staging.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn valid_config(dir: &TempDir) -> AppConfig {
        let a = dir.path().join("pc");
        let b = dir.path().join("phone");
        std::fs::create_dir_all(&a).unwrap();
        std::fs::create_dir_all(&b).unwrap();

        let mut config = AppConfig::default();
        config.device_a.folder = a;
        config.device_b.folder = b;
        config
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.device_a.label, "PC");
        assert_eq!(config.device_b.snapshot_tag, "PHONE");
        assert_eq!(config.sync.max_backups, 5);
        assert_eq!(config.sync.delay(), Duration::from_secs(1));
        assert_eq!(config.sync.block_duration(), Duration::from_secs(2));
        assert_eq!(
            config.sync.conflict_resolution,
            ResolutionStrategy::MergeNoDuplicates
        );
    }

    #[test]
    fn test_missing_keys_take_defaults() {
        let json = r#"{
            "device_a": { "folder": "/music/pc" },
            "sync": { "max_backups": 2, "conflict_resolution": "pc_wins" },
            "conflict_rules": { "Rock.m3u": "skip" }
        }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.device_a.folder, PathBuf::from("/music/pc"));
        assert_eq!(config.device_b.label, "Smartphone");
        assert_eq!(config.sync.max_backups, 2);
        assert_eq!(config.sync.delay_secs, 1.0);
        assert_eq!(config.sync.conflict_resolution, ResolutionStrategy::SideAWins);
        assert_eq!(config.conflict_rules["Rock.m3u"], ResolutionStrategy::Skip);
        assert_eq!(config.schedule_interval, "30min");
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");

        assert!(AppConfig::load_from(&path).unwrap().is_none());

        let mut config = valid_config(&dir);
        config.sync.auto_resolve_conflicts = false;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap().unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_profile_file_names() {
        // No config directory in this environment (no HOME)
        let Ok(default) = AppConfig::config_path(None) else {
            return;
        };
        assert!(default.ends_with("m3u-bridge/config.json"));
        assert_eq!(AppConfig::config_path(Some("default")).unwrap(), default);
        let work = AppConfig::config_path(Some("work")).unwrap();
        assert!(work.ends_with("m3u-bridge/config_work.json"));
    }

    #[test]
    fn test_validate() {
        let dir = TempDir::new().unwrap();
        let config = valid_config(&dir);
        assert!(config.validate().is_ok());

        let mut same = config.clone();
        same.device_b.folder = same.device_a.folder.clone();
        assert!(same.validate().is_err());

        let mut unset = config.clone();
        unset.device_a.folder = PathBuf::new();
        assert!(unset.validate().is_err());

        let mut negative = config;
        negative.sync.delay_secs = -1.0;
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_unplugged_folder_only_fails_setup_check() {
        let dir = TempDir::new().unwrap();
        let mut config = valid_config(&dir);
        assert!(config.require_folders().is_ok());

        config.device_b.folder = dir.path().join("unplugged");
        assert!(config.validate().is_ok());
        assert!(config.require_folders().is_err());
    }

    #[test]
    fn test_huge_durations_saturate() {
        let config = SyncConfig {
            delay_secs: 1e20,
            block_duration_secs: f64::MAX,
            ..SyncConfig::default()
        };
        assert_eq!(config.delay(), Duration::MAX);
        assert_eq!(config.block_duration(), Duration::MAX);
    }

    #[test]
    fn test_negative_durations_clamp_to_zero() {
        let config = SyncConfig {
            delay_secs: -3.0,
            block_duration_secs: f64::NAN,
            ..SyncConfig::default()
        };
        assert_eq!(config.delay(), Duration::ZERO);
        assert_eq!(config.block_duration(), Duration::ZERO);
    }

    #[test]
    fn test_data_layout() {
        let mut config = AppConfig::default();
        config.data_dir = Some(PathBuf::from("/data"));
        let layout = config.data_layout().unwrap();
        assert_eq!(layout.staging, PathBuf::from("/data/Conversion"));
        assert_eq!(layout.backups, PathBuf::from("/data/Backups"));
        assert_eq!(layout.conflicts, PathBuf::from("/data/Conflicts"));
    }
}
