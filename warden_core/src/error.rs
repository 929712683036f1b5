//! Error types for the warden permission engine.
//!
//! Resolution never fails on dangling references (a missing group is
//! skipped, not raised); the error hierarchy below covers the explicit
//! failure surfaces: rank-ladder transitions and registry lookups that
//! callers asked for by name.

use thiserror::Error;

/// Root error type for the warden system.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Ranking error: {0}")]
    Ranking(#[from] RankingError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Errors raised by rank-ladder promotion and demotion.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RankingError {
    #[error("User '{user}' holds no rank in ladder '{ladder}'")]
    NotInLadder { user: String, ladder: String },

    #[error("Promoter '{promoter}' does not out-rank '{user}' in ladder '{ladder}'")]
    InsufficientRank {
        user: String,
        promoter: String,
        ladder: String,
    },

    #[error("No qualifying group {direction} '{user}' in ladder '{ladder}'")]
    NoTargetGroup {
        user: String,
        ladder: String,
        /// "above" for promotion, "below" for demotion.
        direction: &'static str,
    },

    #[error("Ladder '{ladder}' has no group at rank {rank}")]
    MissingLadderGroup { ladder: String, rank: i64 },
}

/// Errors raised by explicit registry lookups.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Group not found: {0}")]
    MissingGroup(String),

    #[error("User not found: {0}")]
    MissingUser(String),
}

/// Result type alias for warden operations.
pub type Result<T> = std::result::Result<T, Error>;
