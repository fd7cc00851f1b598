//! Playlist entries

use super::path::normalize;

/// One line of a playlist file
///
/// Built once on parse and never mutated; lists of entries are rebuilt instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    raw: String,
    normalized: String,
}

impl PlaylistEntry {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let normalized = normalize(&raw);
        Self { raw, normalized }
    }

    /// The line as stored in the file
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Comparable identity; equal to `raw` for comments
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// A comment is a line whose first character is `#`
    pub fn is_comment(&self) -> bool {
        self.raw.starts_with('#')
    }
}

/// Parse playlist text into entries, keeping comments and skipping blank lines
pub fn parse_entries(content: &str) -> Vec<PlaylistEntry> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(PlaylistEntry::new)
        .collect()
}

/// Number of non-comment entries
pub fn content_count(entries: &[PlaylistEntry]) -> usize {
    entries.iter().filter(|e| !e.is_comment()).count()
}
