//! Conflict resolution strategies

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How two diverged versions of a playlist are reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Keep device A's version
    #[serde(alias = "pc_wins")]
    SideAWins,
    /// Keep device B's version
    #[serde(alias = "smartphone_wins")]
    SideBWins,
    /// A's entries followed by all of B's
    MergeBoth,
    /// A's entries followed by B's entries not already present
    #[default]
    MergeNoDuplicates,
    /// Leave for a human to decide
    Manual,
    /// Leave both files untouched
    Skip,
}

impl ResolutionStrategy {
    pub const ALL: [ResolutionStrategy; 6] = [
        ResolutionStrategy::SideAWins,
        ResolutionStrategy::SideBWins,
        ResolutionStrategy::MergeBoth,
        ResolutionStrategy::MergeNoDuplicates,
        ResolutionStrategy::Manual,
        ResolutionStrategy::Skip,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SideAWins => "side_a_wins",
            Self::SideBWins => "side_b_wins",
            Self::MergeBoth => "merge_both",
            Self::MergeNoDuplicates => "merge_no_duplicates",
            Self::Manual => "manual",
            Self::Skip => "skip",
        }
    }

    /// Whether applying this strategy produces a playlist
    pub fn is_automatic(&self) -> bool {
        !matches!(self, Self::Manual | Self::Skip)
    }

    /// Human readable description using the configured device labels
    pub fn describe(&self, label_a: &str, label_b: &str) -> String {
        match self {
            Self::SideAWins => format!("{} version wins", label_a),
            Self::SideBWins => format!("{} version wins", label_b),
            Self::MergeBoth => "Merge both (keep duplicates)".to_string(),
            Self::MergeNoDuplicates => "Merge both (remove duplicates)".to_string(),
            Self::Manual => "Decide later".to_string(),
            Self::Skip => "Skip".to_string(),
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
