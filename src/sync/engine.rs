//! Sync engine orchestration
//!
//! A full pass first settles every playlist that diverged on both devices, then
//! walks each device and propagates one-sided changes: compare against the
//! staged copy, back up, stage, push to the other device. File events run the
//! same per-file flow for a single playlist.

use chrono::Local;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::config::{DataLayout, SyncConfig};
use crate::conflict::{
    self, ConflictResolver, PlaylistConflict, PlaylistStats, ResolutionStrategy,
};
use crate::device::{Device, DevicePair, Side};
use crate::error::{Result, SyncError};
use crate::playlist::store::{self, base_name, strip_version_suffix};
use crate::playlist::{
    content_count, fingerprint, is_reserved_header, parse_entries, relativize, PlaylistEntry,
};
use crate::sync::backup::{BackupManager, ConflictArchive};
use crate::sync::state::SyncState;

/// What happened to one playlist file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Not a playlist file
    Ignored,
    /// Same content as the staged copy
    NoChange,
    /// Processed too recently
    Debounced,
    /// Event caused by our own recent write
    EchoSuppressed,
    /// Handled as a conflict earlier in the same pass
    SkippedConflict,
    /// Both devices diverged; routed to conflict handling
    Conflict(ConflictOutcome),
    /// Staged and pushed to the other device
    Synced {
        destination: Side,
        files_written: usize,
    },
    Failed(String),
}

impl FileOutcome {
    pub fn files_written(&self) -> usize {
        match self {
            FileOutcome::Synced { files_written, .. } => *files_written,
            FileOutcome::Conflict(outcome) => outcome.files_written(),
            _ => 0,
        }
    }
}

/// What happened to a detected conflict
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictOutcome {
    Resolved {
        strategy: ResolutionStrategy,
        files_written: usize,
    },
    /// Strategy was skip; both files left as they are
    Skipped,
    /// Needs a human decision; both files left as they are
    AwaitingManual,
    Failed(String),
}

impl ConflictOutcome {
    pub fn files_written(&self) -> usize {
        match self {
            ConflictOutcome::Resolved { files_written, .. } => *files_written,
            _ => 0,
        }
    }

    /// Whether the conflict still stands after this pass
    pub fn is_standing(&self) -> bool {
        !matches!(self, ConflictOutcome::Resolved { .. })
    }
}

#[derive(Debug, Clone)]
pub struct FileReport {
    pub side: Side,
    pub name: String,
    pub outcome: FileOutcome,
}

#[derive(Debug, Clone)]
pub struct ConflictReport {
    pub conflict: PlaylistConflict,
    pub outcome: ConflictOutcome,
}

/// Result of a full sync pass
#[derive(Debug, Default)]
pub struct SyncReport {
    pub conflicts: Vec<ConflictReport>,
    pub files: Vec<FileReport>,
}

impl SyncReport {
    /// Every file written by the pass: backups, snapshots, staged and pushed copies
    pub fn files_written(&self) -> usize {
        let files: usize = self.files.iter().map(|f| f.outcome.files_written()).sum();
        let conflicts: usize = self.conflicts.iter().map(|c| c.outcome.files_written()).sum();
        files + conflicts
    }

    pub fn synced(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::Synced { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::Failed(_)))
            .count()
    }

    /// Conflicts left unresolved, to be surfaced until someone clears them
    pub fn standing_conflicts(&self) -> impl Iterator<Item = &ConflictReport> {
        self.conflicts.iter().filter(|c| c.outcome.is_standing())
    }
}

/// Duplicate tracks found in one playlist
#[derive(Debug, Clone)]
pub struct DuplicateReport {
    pub side: Side,
    pub name: String,
    pub path: PathBuf,
    pub duplicates: BTreeMap<String, Vec<usize>>,
}

impl DuplicateReport {
    /// Entries that would be dropped by deduplication
    pub fn extra_entries(&self) -> usize {
        self.duplicates.values().map(|v| v.len() - 1).sum()
    }
}

/// Keeps the playlists of two devices reconciled through a staging folder
pub struct SyncEngine {
    devices: DevicePair,
    layout: DataLayout,
    resolver: ConflictResolver,
    state: Arc<SyncState>,
    dry_run: bool,
}

impl SyncEngine {
    pub fn new(
        devices: DevicePair,
        layout: DataLayout,
        resolver: ConflictResolver,
        state: Arc<SyncState>,
    ) -> Self {
        Self {
            devices,
            layout,
            resolver,
            state,
            dry_run: false,
        }
    }

    /// Log every write instead of performing it
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn devices(&self) -> &DevicePair {
        &self.devices
    }

    pub fn resolver(&self) -> &ConflictResolver {
        &self.resolver
    }

    /// Run a full pass over both devices.
    ///
    /// Per-file and per-conflict problems end up in the report; only a missing
    /// staging folder fails the pass.
    pub async fn run_full_pass(&self, config: &SyncConfig) -> Result<SyncReport> {
        self.check_staging().await?;

        let mut report = SyncReport::default();

        self.convert_legacy_playlists().await;
        let listings = self.list_devices().await;

        // Conflicts first so the one-way flow never overwrites one mid-pass
        let handled = self
            .resolve_pending_conflicts(&listings, config, &mut report)
            .await;

        for side in Side::BOTH {
            let Some(playlists) = listings.get(&side) else {
                continue;
            };

            for (name, path) in playlists {
                let outcome = if handled.contains(name) {
                    debug!("Skipping {} - conflict handled this pass", name);
                    FileOutcome::SkippedConflict
                } else {
                    self.process_file(side, path, name, config, false).await
                };

                report.files.push(FileReport {
                    side,
                    name: name.clone(),
                    outcome,
                });
            }
        }

        info!(
            "Pass complete: {} synced, {} conflicts, {} failed",
            report.synced(),
            report.conflicts.len(),
            report.failed()
        );
        Ok(report)
    }

    /// Handle a create/modify event for a file on one device.
    ///
    /// Safe to call repeatedly for the same change; duplicates are absorbed by
    /// the debounce and echo windows.
    pub async fn handle_file_event(
        &self,
        path: &Path,
        side: Side,
        config: &SyncConfig,
    ) -> Result<FileReport> {
        self.check_staging().await?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let lower = file_name.to_lowercase();
        let is_legacy = lower.ends_with(".m3u8");

        if !(lower.ends_with(".m3u") || is_legacy) {
            return Ok(FileReport {
                side,
                name: file_name,
                outcome: FileOutcome::Ignored,
            });
        }

        info!(
            "Change detected in {}: {}",
            self.devices.get(side).label(),
            path.display()
        );

        let mut source = path.to_path_buf();
        let mut canonical_source = file_name.clone();
        if is_legacy {
            let target = store::legacy_target(path);
            canonical_source = target
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            if self.dry_run {
                info!("[DRY-RUN] Would rename: {}", file_name);
            } else {
                if let Err(e) = fs::rename(path, &target).await {
                    let err = SyncError::Rename {
                        from: path.to_path_buf(),
                        to: target,
                        source: e,
                    };
                    warn!("{}", err);
                    return Ok(FileReport {
                        side,
                        name: canonical_source,
                        outcome: FileOutcome::Failed(err.to_string()),
                    });
                }
                info!("Renamed .m3u8 -> .m3u: {}", file_name);
                source = target;
            }
        }

        let name = strip_version_suffix(&canonical_source);
        let outcome = self.process_file(side, &source, &name, config, true).await;

        Ok(FileReport {
            side,
            name,
            outcome,
        })
    }

    /// Conflicts between the two devices as they stand now, without acting on them
    pub async fn detect_conflicts(&self) -> Vec<PlaylistConflict> {
        let listings = self.list_devices().await;
        let (Some(a), Some(b)) = (listings.get(&Side::A), listings.get(&Side::B)) else {
            return Vec::new();
        };

        let mut conflicts = Vec::new();
        for (name, a_path) in a {
            if let Some(b_path) = b.get(name) {
                if let Some(conflict) = self.find_conflict(name, a_path, b_path).await {
                    conflicts.push(conflict);
                }
            }
        }
        conflicts
    }

    /// Apply a strategy chosen by a person, whatever `auto_resolve_conflicts` says
    pub async fn resolve_manually(
        &self,
        conflict: &PlaylistConflict,
        strategy: ResolutionStrategy,
        config: &SyncConfig,
    ) -> ConflictOutcome {
        let rewritten = relativized(conflict, &self.devices);
        match self.resolver.resolve_conflict(&rewritten, Some(strategy)) {
            Some(entries) => self.apply_resolution(conflict, &entries, strategy, config).await,
            None if strategy == ResolutionStrategy::Skip => ConflictOutcome::Skipped,
            None => ConflictOutcome::AwaitingManual,
        }
    }

    /// Playlists on either device containing the same track more than once
    pub async fn scan_duplicates(&self) -> Vec<DuplicateReport> {
        let mut reports = Vec::new();

        for (side, playlists) in self.list_devices().await {
            for (name, path) in playlists {
                let entries = match store::read_entries(&path).await {
                    Ok(entries) => entries,
                    Err(e) => {
                        warn!("Error scanning for duplicates: {}", e);
                        continue;
                    }
                };

                let duplicates = conflict::find_duplicates(&entries);
                if duplicates.is_empty() {
                    continue;
                }

                let report = DuplicateReport {
                    side,
                    name,
                    path,
                    duplicates,
                };
                debug!(
                    "Found {} duplicates in {}",
                    report.extra_entries(),
                    report.name
                );
                reports.push(report);
            }
        }

        info!("Found duplicates in {} playlists", reports.len());
        reports
    }

    /// Rewrite every playlist that has duplicates, backing each up first.
    ///
    /// Returns the number of entries removed.
    pub async fn remove_duplicates(&self, config: &SyncConfig) -> usize {
        let backups = BackupManager::new(self.layout.backups.clone(), config.max_backups);
        let mut total = 0;

        for report in self.scan_duplicates().await {
            match self.dedupe_file(&report, &backups).await {
                Ok(removed) => total += removed,
                Err(e) => error!("Error removing duplicates from {}: {}", report.name, e),
            }
        }

        total
    }

    /// Statistics for a playlist, looked up on device A first
    pub async fn analyze_playlist(&self, name: &str) -> Option<(Side, PlaylistStats)> {
        for device in self.devices.iter() {
            let path = device.playlist_path(name);
            if !fs::try_exists(&path).await.unwrap_or(false) {
                continue;
            }
            match store::read_entries(&path).await {
                Ok(entries) => return Some((device.side(), conflict::analyze(&entries))),
                Err(e) => warn!("{}", e),
            }
        }
        None
    }

    async fn process_file(
        &self,
        side: Side,
        path: &Path,
        name: &str,
        config: &SyncConfig,
        check_conflict: bool,
    ) -> FileOutcome {
        if self.state.is_debounced(name, config.delay()) {
            self.log_debounced(name);
            return FileOutcome::Debounced;
        }

        if self.state.is_echo(side, name) {
            debug!(
                "Ignoring {} on {}: written by us moments ago",
                name,
                self.devices.get(side).label()
            );
            return FileOutcome::EchoSuppressed;
        }

        if check_conflict {
            if let Some(outcome) = self.check_event_conflict(side, path, name, config).await {
                return FileOutcome::Conflict(outcome);
            }
        }

        match self.reconcile(side, path, name, config).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Sync error [{}] - {}", name, e);
                FileOutcome::Failed(e.to_string())
            }
        }
    }

    /// Compare a device file with its staged copy; stage and push it when it changed
    async fn reconcile(
        &self,
        side: Side,
        path: &Path,
        name: &str,
        config: &SyncConfig,
    ) -> Result<FileOutcome> {
        let origin = self.devices.get(side);
        let target = self.devices.get(side.opposite());

        let lines = store::read_lines(path).await?;
        let content = store::render_reconciled(
            origin.label(),
            target.label(),
            origin.root(),
            &lines,
            Local::now().naive_local(),
        );

        if let Some(staged) = self.staged_fingerprint(name).await? {
            if staged == fingerprint(content.lines()) {
                info!("No change in {}: {}", origin.label(), name);
                return Ok(FileOutcome::NoChange);
            }
        }

        if !target.is_available().await {
            return Err(SyncError::DeviceUnavailable {
                label: target.label().to_string(),
                path: target.root().to_path_buf(),
            });
        }

        info!("Sync needed from {}: {}", origin.label(), name);

        if self.dry_run {
            info!(
                "[DRY-RUN] Would stage {} and push it to {}",
                name,
                target.label()
            );
            return Ok(FileOutcome::Synced {
                destination: target.side(),
                files_written: 0,
            });
        }

        // Claim the name so a concurrent trigger cannot stage it twice
        if !self.state.try_begin(name, config.delay()) {
            self.log_debounced(name);
            return Ok(FileOutcome::Debounced);
        }

        let files_written = self.stage_and_push(name, &content, &[target], config).await?;
        Ok(FileOutcome::Synced {
            destination: target.side(),
            files_written,
        })
    }

    fn log_debounced(&self, name: &str) {
        let since = self.state.since_processed(name).unwrap_or_default();
        debug!(
            "Skipping {}: triggered {:.1}s after the last sync",
            name,
            since.as_secs_f64()
        );
    }

    /// Back up, stage, and write `content` to each target device
    async fn stage_and_push(
        &self,
        name: &str,
        content: &str,
        targets: &[&Device],
        config: &SyncConfig,
    ) -> Result<usize> {
        let mut written = 0;

        let backups = BackupManager::new(self.layout.backups.clone(), config.max_backups);
        match backups.create_backup(base_name(name), content).await {
            Ok(_) => written += 1,
            Err(e) => warn!("Backup failed - {}", e),
        }

        store::write_atomic(&self.layout.staging.join(name), content).await?;
        written += 1;

        for target in targets {
            // Block first so the watcher never sees our write as a fresh change
            self.state
                .record_push(target.side(), name, config.block_duration());
            store::write_atomic(&target.playlist_path(name), content).await?;
            written += 1;
            info!("Pushed to {}: {}", target.label(), name);
        }

        self.state.mark_processed(name);
        Ok(written)
    }

    async fn resolve_pending_conflicts(
        &self,
        listings: &BTreeMap<Side, BTreeMap<String, PathBuf>>,
        config: &SyncConfig,
        report: &mut SyncReport,
    ) -> HashSet<String> {
        let mut handled = HashSet::new();

        let (Some(a), Some(b)) = (listings.get(&Side::A), listings.get(&Side::B)) else {
            warn!("Conflict detection skipped: a device folder is unavailable");
            return handled;
        };

        for (name, a_path) in a {
            let Some(b_path) = b.get(name) else {
                continue;
            };
            let Some(conflict) = self.find_conflict(name, a_path, b_path).await else {
                continue;
            };

            handled.insert(name.clone());
            let outcome = self.handle_conflict(&conflict, config).await;
            report.conflicts.push(ConflictReport { conflict, outcome });
        }

        if report.conflicts.is_empty() {
            debug!("No conflicts detected");
        } else {
            info!("Found {} playlist conflicts", report.conflicts.len());
        }

        handled
    }

    async fn check_event_conflict(
        &self,
        side: Side,
        path: &Path,
        name: &str,
        config: &SyncConfig,
    ) -> Option<ConflictOutcome> {
        let other = self.devices.get(side.opposite()).playlist_path(name);
        if !fs::try_exists(&other).await.unwrap_or(false) {
            return None;
        }

        let (a_path, b_path) = match side {
            Side::A => (path, other.as_path()),
            Side::B => (other.as_path(), path),
        };
        let conflict = self.find_conflict(name, a_path, b_path).await?;
        Some(self.handle_conflict(&conflict, config).await)
    }

    /// A conflict is two copies that differ where neither still matches the
    /// staged copy; if one side is unchanged since the last sync, the other
    /// side's edit simply propagates.
    async fn find_conflict(
        &self,
        name: &str,
        a_path: &Path,
        b_path: &Path,
    ) -> Option<PlaylistConflict> {
        let conflict = self.resolver.detect_conflict(name, a_path, b_path).await?;

        match self.staged_fingerprint(name).await {
            Ok(Some(staged)) => {
                for device in self.devices.iter() {
                    let current = reconciled_fingerprint(conflict.version(device.side()), device.root());
                    if current == staged {
                        debug!(
                            "{}: unchanged on {} since last sync, not a conflict",
                            name,
                            device.label()
                        );
                        return None;
                    }
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Cannot read staged copy of {}: {}", name, e),
        }

        info!("Conflict detected: {}", name);
        debug!(
            "{}",
            conflict.summary(self.devices.get(Side::A).label(), self.devices.get(Side::B).label())
        );
        Some(conflict)
    }

    async fn handle_conflict(
        &self,
        conflict: &PlaylistConflict,
        config: &SyncConfig,
    ) -> ConflictOutcome {
        let name = &conflict.playlist_name;

        if !config.auto_resolve_conflicts {
            info!("Manual resolution required for: {}", name);
            return ConflictOutcome::AwaitingManual;
        }

        let strategy = self.resolver.strategy_for(name, config.conflict_resolution);
        let rewritten = relativized(conflict, &self.devices);
        match self.resolver.resolve_conflict(&rewritten, Some(strategy)) {
            Some(entries) => self.apply_resolution(conflict, &entries, strategy, config).await,
            None => {
                warn!("Could not auto-resolve conflict: {} ({})", name, strategy);
                if strategy == ResolutionStrategy::Skip {
                    ConflictOutcome::Skipped
                } else {
                    ConflictOutcome::AwaitingManual
                }
            }
        }
    }

    async fn apply_resolution(
        &self,
        conflict: &PlaylistConflict,
        entries: &[PlaylistEntry],
        strategy: ResolutionStrategy,
        config: &SyncConfig,
    ) -> ConflictOutcome {
        let name = &conflict.playlist_name;

        if self.dry_run {
            info!("[DRY-RUN] Would resolve conflict: {} using {}", name, strategy);
            return ConflictOutcome::Resolved {
                strategy,
                files_written: 0,
            };
        }

        let mut written = 0;
        if config.backup_before_resolve {
            let archive = ConflictArchive::new(self.layout.conflicts.clone());
            match archive.snapshot(conflict, &self.devices).await {
                Ok(paths) => written += paths.len(),
                Err(e) => warn!("Failed to back up conflict versions: {}", e),
            }
        }

        let content = conflict::render_resolved(entries, Local::now().naive_local());
        let targets: Vec<&Device> = self.devices.iter().collect();

        match self.stage_and_push(name, &content, &targets, config).await {
            Ok(n) => {
                info!(
                    "Resolved conflict: {} ({} songs)",
                    name,
                    content_count(entries)
                );
                ConflictOutcome::Resolved {
                    strategy,
                    files_written: written + n,
                }
            }
            Err(e) => {
                error!("Failed to write resolution for {}: {}", name, e);
                ConflictOutcome::Failed(e.to_string())
            }
        }
    }

    async fn dedupe_file(&self, report: &DuplicateReport, backups: &BackupManager) -> Result<usize> {
        let original = fs::read_to_string(&report.path)
            .await
            .map_err(|e| SyncError::read(&report.path, e))?;
        let entries = parse_entries(&original);
        let cleaned = conflict::remove_duplicates(&entries);
        let removed = content_count(&entries) - content_count(&cleaned);

        if self.dry_run {
            info!(
                "[DRY-RUN] Would remove {} duplicates from {}",
                removed, report.name
            );
            return Ok(removed);
        }

        backups.create_backup(base_name(&report.name), &original).await?;
        let content = conflict::render_resolved(&cleaned, Local::now().naive_local());
        store::write_atomic(&report.path, &content).await?;

        info!(
            "Removed {} duplicates from {} on {}",
            removed,
            report.name,
            self.devices.get(report.side).label()
        );
        Ok(removed)
    }

    async fn convert_legacy_playlists(&self) {
        for device in self.devices.iter() {
            if self.dry_run {
                if let Ok(legacy) = store::list_legacy(device.root()).await {
                    for path in legacy {
                        info!("[DRY-RUN] Would rename: {}", path.display());
                    }
                }
                continue;
            }

            if let Err(e) = store::rename_legacy_extension(device.root()).await {
                debug!("Skipping .m3u8 scan on {}: {}", device.label(), e);
            }
        }
    }

    async fn list_devices(&self) -> BTreeMap<Side, BTreeMap<String, PathBuf>> {
        let mut listings = BTreeMap::new();

        for device in self.devices.iter() {
            match device.list_playlists().await {
                Ok(playlists) => {
                    listings.insert(device.side(), playlists);
                }
                Err(e) => warn!("{} folder skipped this pass: {}", device.label(), e),
            }
        }

        listings
    }

    async fn staged_fingerprint(&self, name: &str) -> Result<Option<String>> {
        let staged_path = self.layout.staging.join(name);
        if !fs::try_exists(&staged_path).await.unwrap_or(false) {
            return Ok(None);
        }
        let lines = store::read_lines(&staged_path).await?;
        Ok(Some(fingerprint(&lines)))
    }

    async fn check_staging(&self) -> Result<()> {
        let is_dir = fs::metadata(&self.layout.staging)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);

        if is_dir {
            Ok(())
        } else {
            Err(SyncError::StagingUnavailable(self.layout.staging.clone()))
        }
    }
}

/// Fingerprint of entries as they would look once reconciled from `root`
fn reconciled_fingerprint(entries: &[PlaylistEntry], root: &Path) -> String {
    fingerprint(entries.iter().map(|e| relativize(e.raw(), root)))
}

/// Copy of `conflict` with each side's entries rewritten relative to its own
/// device root, so a resolution is written the same way a reconcile would be
fn relativized(conflict: &PlaylistConflict, devices: &DevicePair) -> PlaylistConflict {
    let rewrite = |side: Side| -> Vec<PlaylistEntry> {
        let root = devices.get(side).root();
        conflict
            .version(side)
            .iter()
            .filter(|e| !is_reserved_header(e.raw()))
            .map(|e| relativize(e.raw(), root))
            .filter(|line| !line.is_empty())
            .map(PlaylistEntry::new)
            .collect()
    };

    PlaylistConflict {
        side_a: rewrite(Side::A),
        side_b: rewrite(Side::B),
        ..conflict.clone()
    }
}
