//! Reading and writing playlist files

use chrono::NaiveDateTime;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::fs;
use tracing::{debug, info, warn};

use super::entry::{parse_entries, PlaylistEntry};
use super::hash::is_reserved_header;
use super::path::relativize;
use crate::error::{Result, SyncError};

/// Timestamp format used inside generated headers
pub const HEADER_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static VERSION_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(_v\d+)+\.m3u$").expect("valid version suffix pattern"));

/// Remove every trailing `_v<digits>` token in front of `.m3u`.
///
/// `MyMix_v2_v5.m3u` becomes `MyMix.m3u`; names without a suffix are unchanged.
pub fn strip_version_suffix(file_name: &str) -> String {
    VERSION_SUFFIX.replace(file_name, ".m3u").into_owned()
}

/// Whether a file name carries a `_v<digits>` version suffix
pub fn is_versioned(file_name: &str) -> bool {
    VERSION_SUFFIX.is_match(file_name)
}

/// File name without the `.m3u` extension, used to name backups
pub fn base_name(file_name: &str) -> &str {
    file_name.strip_suffix(".m3u").unwrap_or(file_name)
}

/// Read every line of a playlist file
pub async fn read_lines(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| SyncError::read(path, e))?;
    Ok(content.lines().map(str::to_string).collect())
}

/// Read a playlist file into entries, comments included, order preserved
pub async fn read_entries(path: &Path) -> Result<Vec<PlaylistEntry>> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| SyncError::read(path, e))?;
    Ok(parse_entries(&content))
}

/// Replace a file's content in one step.
///
/// Content goes to a hidden sibling first and is renamed over the destination,
/// so readers never see a half-written playlist.
pub async fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

    fs::write(&tmp_path, content)
        .await
        .map_err(|e| SyncError::write(&tmp_path, e))?;

    if let Err(source) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(SyncError::Rename {
            from: tmp_path,
            to: path.to_path_buf(),
            source,
        });
    }

    debug!("Wrote {}", path.display());
    Ok(())
}

/// Render a reconciled playlist: fresh header, then every non-header line
/// rewritten relative to `relative_base`.
pub fn render_reconciled<S: AsRef<str>>(
    origin_label: &str,
    target_label: &str,
    relative_base: &Path,
    lines: &[S],
    generated_at: NaiveDateTime,
) -> String {
    let mut content = format!(
        "# Generated on {}\n# Source Folder: {}\n# Target Folder: {}\n",
        generated_at.format(HEADER_TIME_FORMAT),
        origin_label,
        target_label
    );

    for line in lines {
        let line = line.as_ref();
        if is_reserved_header(line) {
            continue;
        }
        let rewritten = relativize(line, relative_base);
        if rewritten.is_empty() {
            continue;
        }
        content.push_str(&rewritten);
        content.push('\n');
    }

    content
}

/// Unversioned `.m3u` playlists in a folder, keyed by file name
pub async fn list_playlists(folder: &Path) -> Result<BTreeMap<String, PathBuf>> {
    let mut playlists = BTreeMap::new();

    for (name, path) in list_files(folder).await? {
        if name.ends_with(".m3u") && !is_versioned(&name) {
            playlists.insert(name, path);
        }
    }

    Ok(playlists)
}

/// `.m3u8` files in a folder that still need renaming
pub async fn list_legacy(folder: &Path) -> Result<Vec<PathBuf>> {
    Ok(list_files(folder)
        .await?
        .into_iter()
        .filter(|(name, _)| name.ends_with(".m3u8"))
        .map(|(_, path)| path)
        .collect())
}

/// Path a legacy `.m3u8` file is renamed to
pub fn legacy_target(path: &Path) -> PathBuf {
    path.with_extension("m3u")
}

/// Rename every `*.m3u8` in a folder to `*.m3u`.
///
/// A failing file is logged and skipped; only an unreadable folder is an error.
pub async fn rename_legacy_extension(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut renamed = Vec::new();

    for original in list_legacy(folder).await? {
        let target = legacy_target(&original);
        match fs::rename(&original, &target).await {
            Ok(()) => {
                info!(
                    "Renamed .m3u8 -> .m3u: {}",
                    original.file_name().unwrap_or_default().to_string_lossy()
                );
                renamed.push(target);
            }
            Err(e) => {
                warn!("Rename failed: {} - {}", original.display(), e);
            }
        }
    }

    Ok(renamed)
}

async fn list_files(folder: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut dir = fs::read_dir(folder)
        .await
        .map_err(|e| SyncError::list(folder, e))?;

    let mut files = Vec::new();
    while let Some(entry) = dir
        .next_entry()
        .await
        .map_err(|e| SyncError::list(folder, e))?
    {
        let is_file = entry
            .file_type()
            .await
            .map(|t| t.is_file())
            .unwrap_or(false);
        if !is_file {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        files.push((name, entry.path()));
    }

    files.sort();
    Ok(files)
}
