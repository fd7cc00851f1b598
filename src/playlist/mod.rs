//! Playlist parsing, normalization, fingerprinting and file storage

pub mod entry;
pub mod hash;
pub mod path;
pub mod store;

pub use entry::{content_count, parse_entries, PlaylistEntry};
pub use hash::{fingerprint, is_reserved_header};
pub use path::{normalize, relativize};
