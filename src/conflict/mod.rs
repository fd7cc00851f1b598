//! Playlist conflicts between the two devices

pub mod resolver;
pub mod strategy;

pub use resolver::{
    analyze, find_duplicates, merge_playlists, remove_duplicates, render_resolved,
    ConflictKind, ConflictResolver, PlaylistConflict, PlaylistStats,
};
pub use strategy::ResolutionStrategy;
