//! Sync engine module

pub mod backup;
pub mod engine;
pub mod schedule;
pub mod state;

pub use engine::{ConflictOutcome, FileOutcome, SyncEngine, SyncReport};
pub use schedule::{run_scheduler, Schedule};
pub use state::SyncState;
