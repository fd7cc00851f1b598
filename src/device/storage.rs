//! Playlist folder of a single device

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::Side;
use crate::error::Result;
use crate::playlist::store;

/// One side of the sync: a labelled folder holding `.m3u` playlists
#[derive(Debug, Clone)]
pub struct Device {
    side: Side,
    label: String,
    root: PathBuf,
    snapshot_tag: String,
}

impl Device {
    pub fn new(
        side: Side,
        label: impl Into<String>,
        root: PathBuf,
        snapshot_tag: impl Into<String>,
    ) -> Self {
        Self {
            side,
            label: label.into(),
            root,
            snapshot_tag: snapshot_tag.into(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Label written into generated headers (`# Source Folder: <label>`)
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Tag used in pre-resolution snapshot names, e.g. `Rock_PHONE_<ts>.m3u`
    pub fn snapshot_tag(&self) -> &str {
        &self.snapshot_tag
    }

    /// Path of a playlist with the given file name on this device
    pub fn playlist_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Whether the device folder is currently reachable
    pub async fn is_available(&self) -> bool {
        fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Unversioned playlists on this device keyed by file name
    pub async fn list_playlists(&self) -> Result<BTreeMap<String, PathBuf>> {
        store::list_playlists(&self.root).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_availability_follows_folder() {
        let dir = TempDir::new().unwrap();
        let present = Device::new(Side::A, "PC", dir.path().to_path_buf(), "PC");
        let missing = Device::new(Side::B, "Phone", dir.path().join("unplugged"), "PHONE");

        assert!(present.is_available().await);
        assert!(!missing.is_available().await);
        assert!(missing.list_playlists().await.is_err());
    }

    #[test]
    fn test_playlist_path() {
        let device = Device::new(Side::A, "PC", PathBuf::from("/music"), "PC");
        assert_eq!(device.playlist_path("Rock.m3u"), PathBuf::from("/music/Rock.m3u"));
    }
}
