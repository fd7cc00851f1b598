//! Path handling for playlist lines
//!
//! Two devices mount the music library under different roots, so the only
//! reliable identity of a track across both sides is its file name. Comparison
//! uses [`normalize`]; writing keeps the full path, rewritten by [`relativize`].

use std::path::Path;

/// Canonical comparable form of a playlist line.
///
/// Blank lines and comments (lines starting with `#`) come back verbatim.
/// Anything else is trimmed, separator-normalized, lower-cased, collapsed
/// (`./`, resolvable `../`) and reduced to its last path component.
///
/// ```ignore
/// assert_eq!(normalize("C:\\Music\\Rock\\SongA.MP3"), "songa.mp3");
/// assert_eq!(normalize("#EXTINF:123,Song"), "#EXTINF:123,Song");
/// ```
pub fn normalize(line: &str) -> String {
    let trimmed = line.trim();
    if trimmed.is_empty() || line.starts_with('#') {
        return line.to_string();
    }

    let lowered = trimmed.replace('\\', "/").to_lowercase();
    let absolute = lowered.starts_with('/');

    match resolve_segments(&lowered, absolute).last() {
        Some(name) => (*name).to_string(),
        None => trimmed.to_string(),
    }
}

/// Rewrite a playlist line relative to `base` for writing.
///
/// Comments and blank lines are returned trimmed. A path sharing a root with
/// `base` becomes relative to it; a relative path is collapsed in place. When no
/// common root exists (another drive letter, a relative base) the trimmed line
/// is returned unchanged.
pub fn relativize(line: &str, base: &Path) -> String {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return trimmed.to_string();
    }

    let cleaned = trimmed.replace('\\', "/");
    let Some(root) = path_root(&cleaned) else {
        return join_segments(resolve_segments(&cleaned, false));
    };

    let base_str = base.to_string_lossy().replace('\\', "/");
    let base_root = match path_root(&base_str) {
        Some(base_root) if base_root.eq_ignore_ascii_case(root) => base_root,
        _ => return trimmed.to_string(),
    };

    let target = resolve_segments(&cleaned[root.len()..], true);
    let from = resolve_segments(&base_str[base_root.len()..], true);

    let common = target
        .iter()
        .zip(from.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<&str> = std::iter::repeat_n("..", from.len() - common).collect();
    parts.extend_from_slice(&target[common..]);
    join_segments(parts)
}

/// Root prefix of an absolute path: `/` or a drive like `C:`
fn path_root(path: &str) -> Option<&str> {
    if path.starts_with('/') {
        return Some("/");
    }

    let bytes = path.as_bytes();
    let is_drive = bytes.len() >= 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes.len() == 2 || bytes[2] == b'/');

    is_drive.then(|| &path[..2])
}

/// Split on `/`, dropping `.` and empty segments and folding `..` into its parent.
///
/// Unresolvable leading `..` are kept for relative paths and dropped for
/// absolute ones.
fn resolve_segments(path: &str, absolute: bool) -> Vec<&str> {
    let mut parts: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(&last) if last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    parts
}

fn join_segments(parts: Vec<&str>) -> String {
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_keeps_comments_verbatim() {
        assert_eq!(normalize("#EXTM3U"), "#EXTM3U");
        assert_eq!(normalize("# Source Folder: PC"), "# Source Folder: PC");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "   ");
    }

    #[test]
    fn test_normalize_reduces_to_lowercase_basename() {
        assert_eq!(normalize("  Music/Rock/SongA.MP3 "), "songa.mp3");
        assert_eq!(normalize("C:\\Users\\me\\Music\\SongA.mp3"), "songa.mp3");
        assert_eq!(normalize("/storage/emulated/0/Music/SongA.mp3"), "songa.mp3");
    }

    #[test]
    fn test_normalize_collapses_dot_segments() {
        assert_eq!(normalize("./Rock/../Pop/SongB.mp3"), "songb.mp3");
        assert_eq!(normalize("../../SongB.mp3"), "songb.mp3");
        assert_eq!(normalize("Rock/SongB.mp3/."), "songb.mp3");
    }

    #[test]
    fn test_normalize_same_track_from_both_devices() {
        let pc = normalize("D:\\Library\\Artist\\Track.flac");
        let phone = normalize("../Music/Artist/track.FLAC");
        assert_eq!(pc, phone);
    }

    #[test]
    fn test_normalize_falls_back_to_trimmed_line() {
        assert_eq!(normalize(" / "), "/");
    }

    #[test]
    fn test_relativize_under_base() {
        let base = Path::new("/home/me/Music");
        assert_eq!(
            relativize("/home/me/Music/Rock/SongA.mp3", base),
            "Rock/SongA.mp3"
        );
    }

    #[test]
    fn test_relativize_outside_base_uses_parent_segments() {
        let base = Path::new("/home/me/Music/Playlists");
        assert_eq!(
            relativize("/home/me/Music/Rock/SongA.mp3\r", base),
            "../Rock/SongA.mp3"
        );
    }

    #[test]
    fn test_relativize_windows_paths() {
        let base = Path::new("C:\\Music");
        assert_eq!(relativize("c:\\Music\\Rock\\SongA.mp3", base), "Rock/SongA.mp3");
    }

    #[test]
    fn test_relativize_different_root_is_unchanged() {
        let base = Path::new("C:/Music");
        assert_eq!(relativize(" D:\\Other\\SongA.mp3 ", base), "D:\\Other\\SongA.mp3");

        let relative_base = Path::new("Music");
        assert_eq!(relativize("/abs/SongA.mp3", relative_base), "/abs/SongA.mp3");
    }

    #[test]
    fn test_relativize_relative_line_is_collapsed() {
        let base = Path::new("/anything");
        assert_eq!(relativize("./Rock/./SongA.mp3", base), "Rock/SongA.mp3");
        assert_eq!(relativize("..\\Music\\SongA.mp3", base), "../Music/SongA.mp3");
        assert_eq!(relativize("SongA.mp3", base), "SongA.mp3");
    }

    #[test]
    fn test_relativize_is_stable() {
        let base = Path::new("/home/me/Music");
        let once = relativize("/home/me/Other/SongA.mp3", base);
        assert_eq!(relativize(&once, base), once);
    }

    #[test]
    fn test_relativize_comments_are_trimmed_only() {
        let base = Path::new("/home/me/Music");
        assert_eq!(relativize("#EXTINF:200,Artist - Title  ", base), "#EXTINF:200,Artist - Title");
    }
}
