//! Timestamped playlist backups and pre-resolution snapshots

use chrono::{Local, NaiveDateTime};
use std::path::PathBuf;
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::conflict::PlaylistConflict;
use crate::device::DevicePair;
use crate::error::{Result, SyncError};
use crate::playlist::store::base_name;

/// Timestamp format used in backup and snapshot file names
pub const BACKUP_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

const STAMP_LEN: usize = 19;

/// Writes `{base}_{timestamp}.m3u` backups and keeps at most `max_backups`
/// per playlist.
///
/// Retention is not atomic with the write: two concurrent reconciliations of
/// the same playlist may briefly leave one extra backup, which the next write
/// cleans up.
#[derive(Debug, Clone)]
pub struct BackupManager {
    root: PathBuf,
    max_backups: usize,
}

impl BackupManager {
    pub fn new(root: PathBuf, max_backups: usize) -> Self {
        Self { root, max_backups }
    }

    /// Back up `content` for a playlist and prune that playlist's old backups
    pub async fn create_backup(&self, base: &str, content: &str) -> Result<PathBuf> {
        let stamp = Local::now().format(BACKUP_TIME_FORMAT).to_string();
        let path = self.unique_path(base, &stamp).await;

        fs::write(&path, content)
            .await
            .map_err(|e| SyncError::write(&path, e))?;
        info!(
            "Backup created: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );

        self.enforce_retention(base).await?;
        Ok(path)
    }

    /// Backups of one playlist, oldest first (modification time, then name)
    pub async fn list_backups(&self, base: &str) -> Result<Vec<PathBuf>> {
        let mut dir = fs::read_dir(&self.root)
            .await
            .map_err(|e| SyncError::list(&self.root, e))?;

        let mut backups: Vec<(SystemTime, String, PathBuf)> = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| SyncError::list(&self.root, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_backup_of(&name, base) {
                continue;
            }
            let modified = entry
                .metadata()
                .await
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            backups.push((modified, name, entry.path()));
        }

        backups.sort();
        Ok(backups.into_iter().map(|(_, _, path)| path).collect())
    }

    /// Delete the oldest backups of a playlist beyond the cap, returning what was removed
    pub async fn enforce_retention(&self, base: &str) -> Result<Vec<PathBuf>> {
        let backups = self.list_backups(base).await?;
        if backups.len() <= self.max_backups {
            return Ok(Vec::new());
        }

        let excess = backups.len() - self.max_backups;
        let mut removed = Vec::new();
        for old in backups.into_iter().take(excess) {
            match fs::remove_file(&old).await {
                Ok(()) => {
                    info!(
                        "Deleted old backup: {}",
                        old.file_name().unwrap_or_default().to_string_lossy()
                    );
                    removed.push(old);
                }
                Err(e) => warn!("{}", SyncError::delete(&old, e)),
            }
        }

        Ok(removed)
    }

    /// Backups written within the same second get an increasing `_NN` suffix,
    /// continuing after the highest one present so name order stays write order.
    async fn unique_path(&self, base: &str, stamp: &str) -> PathBuf {
        let prefix = format!("{}_{}", base, stamp);
        let mut next: Option<u32> = None;

        if let Ok(mut dir) = fs::read_dir(&self.root).await {
            while let Ok(Some(entry)) = dir.next_entry().await {
                let name = entry.file_name().to_string_lossy().into_owned();
                let Some(tail) = name
                    .strip_prefix(&prefix)
                    .and_then(|t| t.strip_suffix(".m3u"))
                else {
                    continue;
                };
                let counter = if tail.is_empty() {
                    0
                } else {
                    match tail.strip_prefix('_').and_then(|n| n.parse::<u32>().ok()) {
                        Some(n) => n,
                        None => continue,
                    }
                };
                next = Some(next.map_or(counter + 1, |n| n.max(counter + 1)));
            }
        }

        match next {
            None => self.root.join(format!("{}.m3u", prefix)),
            Some(counter) => self.root.join(format!("{}_{:02}.m3u", prefix, counter)),
        }
    }
}

/// Whether `file_name` is a backup of playlist `base`: `{base}_{timestamp}[_NN].m3u`
pub fn is_backup_of(file_name: &str, base: &str) -> bool {
    let Some(rest) = file_name
        .strip_prefix(base)
        .and_then(|r| r.strip_prefix('_'))
        .and_then(|r| r.strip_suffix(".m3u"))
    else {
        return false;
    };

    if rest.len() < STAMP_LEN || !rest.is_char_boundary(STAMP_LEN) {
        return false;
    }

    let (stamp, tail) = rest.split_at(STAMP_LEN);
    let counter_ok = tail.is_empty()
        || tail
            .strip_prefix('_')
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()));

    counter_ok && NaiveDateTime::parse_from_str(stamp, BACKUP_TIME_FORMAT).is_ok()
}

/// Keeps both device versions of a playlist before a resolution overwrites them
#[derive(Debug, Clone)]
pub struct ConflictArchive {
    root: PathBuf,
}

impl ConflictArchive {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Write `{base}_{TAG}_{timestamp}.m3u` for each device
    pub async fn snapshot(
        &self,
        conflict: &PlaylistConflict,
        devices: &DevicePair,
    ) -> Result<Vec<PathBuf>> {
        let stamp = Local::now().format(BACKUP_TIME_FORMAT);
        let base = base_name(&conflict.playlist_name);
        let mut written = Vec::new();

        for device in devices.iter() {
            let path = self
                .root
                .join(format!("{}_{}_{}.m3u", base, device.snapshot_tag(), stamp));

            let mut content = format!(
                "# {} version backup before conflict resolution\n",
                device.label()
            );
            for entry in conflict.version(device.side()) {
                content.push_str(entry.raw());
                content.push('\n');
            }

            fs::write(&path, content)
                .await
                .map_err(|e| SyncError::write(&path, e))?;
            debug!("Wrote conflict snapshot {}", path.display());
            written.push(path);
        }

        info!(
            "Backed up conflict versions of {} ({} files)",
            conflict.playlist_name,
            written.len()
        );
        Ok(written)
    }
}
