//! CLI module for m3u-bridge

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::conflict::ResolutionStrategy;
use crate::device::Side;

pub mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "m3u-bridge",
    about = "Keep M3U playlists in sync between two music folders"
)]
#[command(version, author)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration profile to use
    #[arg(short, long, global = true, env = "M3U_BRIDGE_PROFILE")]
    pub profile: Option<String>,
}

/// Device selector for commands that act on one side
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SideArg {
    A,
    B,
}

impl From<SideArg> for Side {
    fn from(side: SideArg) -> Self {
        match side {
            SideArg::A => Side::A,
            SideArg::B => Side::B,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Configure the two playlist folders and create the data folders
    Init {
        /// Playlist folder of device A
        #[arg(long)]
        folder_a: Option<PathBuf>,

        /// Playlist folder of device B
        #[arg(long)]
        folder_b: Option<PathBuf>,

        /// Name of device A used in playlist headers
        #[arg(long)]
        label_a: Option<String>,

        /// Name of device B used in playlist headers
        #[arg(long)]
        label_b: Option<String>,

        /// Where the Conversion, Backups and Conflicts folders live
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Overwrite an existing configuration without asking
        #[arg(long)]
        force: bool,
    },

    /// Run one full sync pass
    Sync {
        /// Dry run - log what would change without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Handle a change to a single playlist file (for file watchers)
    Event {
        /// Changed playlist file
        path: PathBuf,

        /// Device the file belongs to
        #[arg(long, value_enum)]
        side: SideArg,

        /// Dry run - log what would change without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Run full passes on a schedule until interrupted
    Daemon {
        /// Interval such as 15min, 2h, hourly or daily@02:00 (defaults to the configured one)
        #[arg(short, long)]
        interval: Option<String>,

        /// Dry run - log what would change without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// List playlists that diverged on both devices
    Conflicts,

    /// Resolve standing conflicts
    Resolve {
        /// Apply this strategy to every conflict instead of asking
        #[arg(short, long, value_enum)]
        strategy: Option<ResolutionStrategy>,
    },

    /// Find playlists containing the same track more than once
    Duplicates {
        /// Rewrite affected playlists without the duplicates
        #[arg(long)]
        remove: bool,

        /// Dry run - report what would be removed
        #[arg(long, requires = "remove")]
        dry_run: bool,
    },

    /// Show statistics for a playlist
    Analyze {
        /// Playlist name, with or without .m3u
        playlist: String,
    },

    /// Show or set the conflict strategy for one playlist
    Rule {
        /// Playlist name, with or without .m3u
        playlist: String,

        /// Strategy to use for this playlist
        #[arg(value_enum)]
        strategy: Option<ResolutionStrategy>,

        /// Remove the rule so the default strategy applies
        #[arg(long, conflicts_with = "strategy")]
        clear: bool,
    },

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}
