//! Conflict detection, duplicate handling and merging

use chrono::{DateTime, Local, NaiveDateTime};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, info, warn};

use super::ResolutionStrategy;
use crate::device::Side;
use crate::playlist::store::{self, HEADER_TIME_FORMAT};
use crate::playlist::{content_count, PlaylistEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    ContentChange,
}

/// Two device copies of the same playlist whose track sets differ
#[derive(Debug, Clone)]
pub struct PlaylistConflict {
    pub playlist_name: String,
    pub side_a: Vec<PlaylistEntry>,
    pub side_b: Vec<PlaylistEntry>,
    pub side_a_modified: SystemTime,
    pub side_b_modified: SystemTime,
    pub kind: ConflictKind,
}

impl PlaylistConflict {
    /// Whether the non-comment normalized path sets differ
    pub fn has_meaningful_changes(&self) -> bool {
        content_set(&self.side_a) != content_set(&self.side_b)
    }

    pub fn version(&self, side: Side) -> &[PlaylistEntry] {
        match side {
            Side::A => &self.side_a,
            Side::B => &self.side_b,
        }
    }

    /// Side with the later modification time; B on a tie
    pub fn newer_side(&self) -> Side {
        if self.side_a_modified > self.side_b_modified {
            Side::A
        } else {
            Side::B
        }
    }

    /// Multi-line description for people deciding on a resolution
    pub fn summary(&self, label_a: &str, label_b: &str) -> String {
        let difference = match self.side_a_modified.duration_since(self.side_b_modified) {
            Ok(d) => d,
            Err(e) => e.duration(),
        };
        let newer = match self.newer_side() {
            Side::A => label_a,
            Side::B => label_b,
        };

        format!(
            "Conflict in playlist: {}\n\
             {} version: {} songs (modified {})\n\
             {} version: {} songs (modified {})\n\
             Newer version: {} (by {} seconds)",
            self.playlist_name,
            label_a,
            content_count(&self.side_a),
            format_mtime(self.side_a_modified),
            label_b,
            content_count(&self.side_b),
            format_mtime(self.side_b_modified),
            newer.to_uppercase(),
            difference.as_secs()
        )
    }
}

/// Statistics about a single playlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistStats {
    pub total_lines: usize,
    pub content_entries: usize,
    pub comment_lines: usize,
    pub duplicate_groups: usize,
    pub duplicate_entries: usize,
    pub unique_entries: usize,
    pub duplicates: BTreeMap<String, Vec<usize>>,
}

/// Detects and resolves conflicts; remembers per-playlist strategy overrides
#[derive(Debug, Clone, Default)]
pub struct ConflictResolver {
    rules: HashMap<String, ResolutionStrategy>,
    default_strategy: ResolutionStrategy,
}

impl ConflictResolver {
    pub fn new(default_strategy: ResolutionStrategy) -> Self {
        Self {
            rules: HashMap::new(),
            default_strategy,
        }
    }

    /// Add per-playlist rules, e.g. from configuration
    pub fn with_rules<I>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = (String, ResolutionStrategy)>,
    {
        self.rules.extend(rules);
        self
    }

    pub fn set_rule(&mut self, playlist_name: &str, strategy: ResolutionStrategy) {
        info!("Set rule for {}: {}", playlist_name, strategy);
        self.rules.insert(playlist_name.to_string(), strategy);
    }

    pub fn rule_for(&self, playlist_name: &str) -> Option<ResolutionStrategy> {
        self.rules.get(playlist_name).copied()
    }

    /// Strategy for a playlist: its rule if one exists, otherwise `fallback`
    pub fn strategy_for(&self, playlist_name: &str, fallback: ResolutionStrategy) -> ResolutionStrategy {
        self.rule_for(playlist_name).unwrap_or(fallback)
    }

    /// Compare the two device copies of a playlist as they are on disk now.
    ///
    /// A copy that cannot be read counts as empty. Only a difference in the
    /// normalized track sets yields a conflict.
    pub async fn detect_conflict(
        &self,
        playlist_name: &str,
        side_a_path: &Path,
        side_b_path: &Path,
    ) -> Option<PlaylistConflict> {
        let side_a_modified = modified_time(side_a_path).await?;
        let side_b_modified = modified_time(side_b_path).await?;

        let conflict = PlaylistConflict {
            playlist_name: playlist_name.to_string(),
            side_a: read_lenient(side_a_path).await,
            side_b: read_lenient(side_b_path).await,
            side_a_modified,
            side_b_modified,
            kind: ConflictKind::ContentChange,
        };

        if conflict.has_meaningful_changes() {
            debug!("Conflict detected for {}", playlist_name);
            Some(conflict)
        } else {
            None
        }
    }

    /// Apply a strategy to a conflict.
    ///
    /// Without an explicit strategy the playlist's rule applies, then the
    /// default. `None` means no action: the strategy was skip or manual.
    pub fn resolve_conflict(
        &self,
        conflict: &PlaylistConflict,
        strategy: Option<ResolutionStrategy>,
    ) -> Option<Vec<PlaylistEntry>> {
        let name = &conflict.playlist_name;
        let strategy = strategy.unwrap_or_else(|| self.strategy_for(name, self.default_strategy));

        match strategy {
            ResolutionStrategy::SideAWins => {
                info!("Side A version wins for {}", name);
                Some(conflict.side_a.clone())
            }
            ResolutionStrategy::SideBWins => {
                info!("Side B version wins for {}", name);
                Some(conflict.side_b.clone())
            }
            ResolutionStrategy::MergeBoth => {
                info!("Merging both versions of {} (with duplicates)", name);
                Some(merge_playlists(&conflict.side_a, &conflict.side_b, false))
            }
            ResolutionStrategy::MergeNoDuplicates => {
                info!("Merging both versions of {} (no duplicates)", name);
                Some(merge_playlists(&conflict.side_a, &conflict.side_b, true))
            }
            ResolutionStrategy::Skip => {
                info!("Skipping conflict resolution for {}", name);
                None
            }
            ResolutionStrategy::Manual => {
                info!("Manual resolution required for {}", name);
                None
            }
        }
    }
}

/// Indices of entries sharing a normalized path, only for groups of two or more
pub fn find_duplicates(entries: &[PlaylistEntry]) -> BTreeMap<String, Vec<usize>> {
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();

    for (index, entry) in entries.iter().enumerate() {
        if entry.is_comment() {
            continue;
        }
        groups
            .entry(entry.normalized().to_string())
            .or_default()
            .push(index);
    }

    groups.retain(|_, indices| indices.len() > 1);
    groups
}

/// Keep the first occurrence of each track; comments are always kept
pub fn remove_duplicates(entries: &[PlaylistEntry]) -> Vec<PlaylistEntry> {
    let mut seen = HashSet::new();

    entries
        .iter()
        .filter(|entry| entry.is_comment() || seen.insert(entry.normalized()))
        .cloned()
        .collect()
}

/// A's entries followed by B's.
///
/// With `dedupe`, a track from B is dropped when its normalized path already
/// appeared in A or earlier in B, and a final dedupe pass runs on the result.
pub fn merge_playlists(
    entries_a: &[PlaylistEntry],
    entries_b: &[PlaylistEntry],
    dedupe: bool,
) -> Vec<PlaylistEntry> {
    let mut merged = entries_a.to_vec();
    let mut seen: HashSet<&str> = entries_a
        .iter()
        .filter(|e| !e.is_comment())
        .map(|e| e.normalized())
        .collect();

    for entry in entries_b {
        if entry.is_comment() || !dedupe || seen.insert(entry.normalized()) {
            merged.push(entry.clone());
        }
    }

    if dedupe {
        remove_duplicates(&merged)
    } else {
        merged
    }
}

pub fn analyze(entries: &[PlaylistEntry]) -> PlaylistStats {
    let content_entries = content_count(entries);
    let duplicates = find_duplicates(entries);
    let duplicate_entries: usize = duplicates.values().map(|v| v.len() - 1).sum();

    PlaylistStats {
        total_lines: entries.len(),
        content_entries,
        comment_lines: entries.len() - content_entries,
        duplicate_groups: duplicates.len(),
        duplicate_entries,
        unique_entries: content_entries - duplicate_entries,
        duplicates,
    }
}

/// Playlist text for a resolved conflict: resolution header, then entries verbatim
pub fn render_resolved(entries: &[PlaylistEntry], resolved_at: NaiveDateTime) -> String {
    let mut content = format!(
        "# Resolved on {}\n# Merged playlist with conflict resolution\n# Total entries: {}\n",
        resolved_at.format(HEADER_TIME_FORMAT),
        content_count(entries)
    );

    for entry in entries {
        content.push_str(entry.raw());
        content.push('\n');
    }

    content
}

fn content_set(entries: &[PlaylistEntry]) -> HashSet<&str> {
    entries
        .iter()
        .filter(|e| !e.is_comment())
        .map(|e| e.normalized())
        .collect()
}

async fn modified_time(path: &Path) -> Option<SystemTime> {
    match fs::metadata(path).await.and_then(|m| m.modified()) {
        Ok(time) => Some(time),
        Err(e) => {
            warn!("Cannot read modification time of {}: {}", path.display(), e);
            None
        }
    }
}

async fn read_lenient(path: &Path) -> Vec<PlaylistEntry> {
    match store::read_entries(path).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Treating unreadable playlist as empty: {}", e);
            Vec::new()
        }
    }
}

fn format_mtime(time: SystemTime) -> String {
    DateTime::<Local>::from(time).format("%Y-%m-%d %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn entries(lines: &[&str]) -> Vec<PlaylistEntry> {
        lines.iter().map(|l| PlaylistEntry::new(*l)).collect()
    }

    fn raw(entries: &[PlaylistEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.raw()).collect()
    }

    fn conflict(a: &[&str], b: &[&str]) -> PlaylistConflict {
        PlaylistConflict {
            playlist_name: "Rock.m3u".to_string(),
            side_a: entries(a),
            side_b: entries(b),
            side_a_modified: SystemTime::UNIX_EPOCH + Duration::from_secs(1_000),
            side_b_modified: SystemTime::UNIX_EPOCH + Duration::from_secs(1_090),
            kind: ConflictKind::ContentChange,
        }
    }

    #[test]
    fn test_find_duplicates_groups_indices() {
        let list = entries(&["SongA.mp3", "#EXTM3U", "songa.mp3", "SongB.mp3", "Rock/SongA.mp3"]);
        let duplicates = find_duplicates(&list);

        assert_eq!(duplicates.len(), 1);
        assert_eq!(duplicates["songa.mp3"], vec![0, 2, 4]);
    }

    #[test]
    fn test_remove_duplicates_keeps_first_and_comments() {
        let list = entries(&["SongA.mp3", "#EXTM3U", "SongA.mp3", "#EXTM3U", "SongB.mp3", "SongA.mp3"]);
        let cleaned = remove_duplicates(&list);
        assert_eq!(raw(&cleaned), vec!["SongA.mp3", "#EXTM3U", "#EXTM3U", "SongB.mp3"]);
    }

    #[test]
    fn test_remove_duplicates_is_idempotent() {
        let list = entries(&["a.mp3", "b.mp3", "A.MP3", "#x", "c/b.mp3", "d.mp3", "#x"]);
        let once = remove_duplicates(&list);
        let twice = remove_duplicates(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_triple_entry_scenario() {
        let list = entries(&["SongA.mp3", "SongA.mp3", "SongB.mp3", "SongA.mp3"]);

        let duplicates = find_duplicates(&list);
        assert_eq!(duplicates.len(), 1);
        assert_eq!(duplicates["songa.mp3"].len(), 3);

        assert_eq!(raw(&remove_duplicates(&list)), vec!["SongA.mp3", "SongB.mp3"]);
    }

    #[test]
    fn test_merge_without_duplicates_orders_a_then_new_b() {
        let merged = merge_playlists(
            &entries(&["SongA.mp3", "SongC.mp3"]),
            &entries(&["SongA.mp3", "SongB.mp3"]),
            true,
        );
        assert_eq!(raw(&merged), vec!["SongA.mp3", "SongC.mp3", "SongB.mp3"]);
    }

    #[test]
    fn test_merge_with_duplicates_appends_everything() {
        let merged = merge_playlists(
            &entries(&["SongA.mp3", "SongC.mp3"]),
            &entries(&["#EXTM3U", "SongA.mp3", "SongB.mp3"]),
            false,
        );
        assert_eq!(
            raw(&merged),
            vec!["SongA.mp3", "SongC.mp3", "#EXTM3U", "SongA.mp3", "SongB.mp3"]
        );
    }

    #[test]
    fn test_merge_dedupe_has_no_repeated_tracks() {
        let merged = merge_playlists(
            &entries(&["x/a.mp3", "b.mp3", "a.mp3", "#c"]),
            &entries(&["B.mp3", "e.mp3", "e.mp3", "#c", "A.mp3"]),
            true,
        );
        assert!(find_duplicates(&merged).is_empty());
        assert_eq!(raw(&merged), vec!["x/a.mp3", "b.mp3", "#c", "e.mp3", "#c"]);
    }

    #[test]
    fn test_merge_disjoint_keeps_every_track() {
        let a = entries(&["#EXTM3U", "a.mp3", "b.mp3"]);
        let b = entries(&["c.mp3", "#note", "d.mp3", "e.mp3"]);
        let merged = merge_playlists(&a, &b, true);
        assert_eq!(content_count(&merged), content_count(&a) + content_count(&b));
    }

    #[test]
    fn test_meaningful_changes_ignore_comments_and_order() {
        assert!(!conflict(&["#A side", "a.mp3", "b.mp3"], &["B.MP3", "dir/a.mp3"]).has_meaningful_changes());
        assert!(conflict(&["a.mp3"], &["a.mp3", "b.mp3"]).has_meaningful_changes());
    }

    #[test]
    fn test_resolve_strategies() {
        let c = conflict(&["SongA.mp3", "SongC.mp3"], &["SongA.mp3", "SongB.mp3"]);
        let resolver = ConflictResolver::default();

        let a = resolver.resolve_conflict(&c, Some(ResolutionStrategy::SideAWins)).unwrap();
        assert_eq!(raw(&a), vec!["SongA.mp3", "SongC.mp3"]);

        let b = resolver.resolve_conflict(&c, Some(ResolutionStrategy::SideBWins)).unwrap();
        assert_eq!(raw(&b), vec!["SongA.mp3", "SongB.mp3"]);

        let both = resolver.resolve_conflict(&c, Some(ResolutionStrategy::MergeBoth)).unwrap();
        assert_eq!(both.len(), 4);

        let merged = resolver.resolve_conflict(&c, None).unwrap();
        assert_eq!(raw(&merged), vec!["SongA.mp3", "SongC.mp3", "SongB.mp3"]);

        assert!(resolver.resolve_conflict(&c, Some(ResolutionStrategy::Skip)).is_none());
        assert!(resolver.resolve_conflict(&c, Some(ResolutionStrategy::Manual)).is_none());
    }

    #[test]
    fn test_rule_overrides_default_but_not_explicit_strategy() {
        let c = conflict(&["SongA.mp3"], &["SongB.mp3"]);
        let mut resolver = ConflictResolver::new(ResolutionStrategy::MergeBoth);
        resolver.set_rule("Rock.m3u", ResolutionStrategy::SideBWins);

        let by_rule = resolver.resolve_conflict(&c, None).unwrap();
        assert_eq!(raw(&by_rule), vec!["SongB.mp3"]);

        let explicit = resolver
            .resolve_conflict(&c, Some(ResolutionStrategy::SideAWins))
            .unwrap();
        assert_eq!(raw(&explicit), vec!["SongA.mp3"]);

        assert_eq!(
            resolver.strategy_for("Other.m3u", ResolutionStrategy::Skip),
            ResolutionStrategy::Skip
        );
    }

    #[test]
    fn test_summary_mentions_newer_side() {
        let c = conflict(&["a.mp3", "b.mp3"], &["a.mp3"]);
        assert_eq!(c.newer_side(), Side::B);

        let summary = c.summary("PC", "Phone");
        assert!(summary.starts_with("Conflict in playlist: Rock.m3u"));
        assert!(summary.contains("PC version: 2 songs"));
        assert!(summary.contains("Phone version: 1 songs"));
        assert!(summary.contains("Newer version: PHONE (by 90 seconds)"));
    }

    #[test]
    fn test_analyze_counts() {
        let list = entries(&["#EXTM3U", "a.mp3", "b.mp3", "A.mp3", "a.mp3", "#EXTINF:1,x"]);
        let stats = analyze(&list);
        assert_eq!(stats.total_lines, 6);
        assert_eq!(stats.content_entries, 4);
        assert_eq!(stats.comment_lines, 2);
        assert_eq!(stats.duplicate_groups, 1);
        assert_eq!(stats.duplicate_entries, 2);
        assert_eq!(stats.unique_entries, 2);
    }

    #[test]
    fn test_render_resolved_header() {
        let at = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
            .and_then(|d| d.and_hms_opt(3, 4, 5))
            .unwrap();
        let content = render_resolved(&entries(&["#EXTM3U", "a.mp3", "b.mp3"]), at);
        assert_eq!(
            content,
            "# Resolved on 2024-01-02 03:04:05\n\
             # Merged playlist with conflict resolution\n\
             # Total entries: 2\n\
             #EXTM3U\na.mp3\nb.mp3\n"
        );
    }

    #[tokio::test]
    async fn test_detect_conflict_from_files() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.m3u");
        let b = dir.path().join("b.m3u");
        fs::write(&a, "SongA.mp3\nSongC.mp3\n").await.unwrap();
        fs::write(&b, "# Generated on 2024-01-01 00:00:00\nSongA.mp3\nSongB.mp3\n").await.unwrap();

        let resolver = ConflictResolver::default();
        let found = resolver.detect_conflict("Rock.m3u", &a, &b).await.unwrap();
        assert!(found.has_meaningful_changes());
        assert_eq!(found.kind, ConflictKind::ContentChange);
        assert_eq!(found.playlist_name, "Rock.m3u");
        assert_eq!(found.side_b.len(), 3);

        fs::write(&b, "# Source Folder: PC\nsonga.MP3\n../x/SongC.mp3\n").await.unwrap();
        assert!(resolver.detect_conflict("Rock.m3u", &a, &b).await.is_none());
    }

    #[tokio::test]
    async fn test_detect_conflict_missing_file() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.m3u");
        fs::write(&a, "SongA.mp3\n").await.unwrap();

        let resolver = ConflictResolver::default();
        assert!(resolver
            .detect_conflict("Rock.m3u", &a, &dir.path().join("missing.m3u"))
            .await
            .is_none());
    }
}
