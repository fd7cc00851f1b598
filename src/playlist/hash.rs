//! Content fingerprints for change detection
//!
//! Headers this tool writes itself are excluded, so regenerating them never
//! looks like a change and reconciled writes cannot feed back into new syncs.

use sha2::{Digest, Sha256};

/// Line prefixes of generated metadata that never count as content
pub const RESERVED_MARKERS: [&str; 5] = [
    "# Generated on",
    "# Source Folder",
    "# Target Folder",
    "# Resolved on",
    "# Merged playlist",
];

/// Whether a line is generated metadata
pub fn is_reserved_header(line: &str) -> bool {
    let line = line.trim_start();
    RESERVED_MARKERS.iter().any(|marker| line.starts_with(marker))
}

/// SHA-256 over the meaningful lines of a playlist, as lowercase hex.
///
/// Blank and reserved header lines are dropped, the rest trimmed and joined
/// with `\n`.
pub fn fingerprint<I, S>(lines: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let cleaned: Vec<String> = lines
        .into_iter()
        .filter_map(|line| {
            let trimmed = line.as_ref().trim();
            if trimmed.is_empty() || is_reserved_header(trimmed) {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(cleaned.join("\n").as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_do_not_affect_fingerprint() {
        let first = [
            "# Generated on 2024-01-01 10:00:00",
            "# Source Folder: PC",
            "# Target Folder: Smartphone",
            "SongA.mp3",
            "SongB.mp3",
        ];
        let second = [
            "# Generated on 2025-06-30 23:59:59",
            "# Source Folder: Smartphone",
            "# Target Folder: PC",
            "# Resolved on 2025-06-30 23:59:59",
            "# Merged playlist with conflict resolution",
            "SongA.mp3",
            "",
            "  SongB.mp3  ",
        ];
        assert_eq!(fingerprint(first), fingerprint(second));
    }

    #[test]
    fn test_content_changes_fingerprint() {
        assert_ne!(
            fingerprint(["SongA.mp3", "SongB.mp3"]),
            fingerprint(["SongB.mp3", "SongA.mp3"])
        );
        assert_ne!(fingerprint(["SongA.mp3"]), fingerprint(["SongA.mp3", "SongB.mp3"]));
    }

    #[test]
    fn test_other_comments_are_content() {
        assert_ne!(
            fingerprint(["#EXTINF:100,A", "SongA.mp3"]),
            fingerprint(["SongA.mp3"])
        );
    }

    #[test]
    fn test_fingerprint_is_lowercase_sha256_hex() {
        let hash = fingerprint(Vec::<String>::new());
        // SHA-256 of the empty string
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
