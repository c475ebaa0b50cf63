// crates/pipescan-core/src/error.rs

//! Error kinds surfaced by forest transitions.
//!
//! Every fallible operation returns one of these; none are retried
//! internally. A failed `update` leaves the caller's forest untouched.

use pipescan_tree::TreeError;
use thiserror::Error;

/// Operation failures of the scan forest.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ScanError {
    /// More base data supplied than one round may admit.
    #[error("data count {got} exceeds the per-round cap of {max} base jobs")]
    DataCountExceeded {
        /// Data items supplied.
        got: usize,
        /// Per-round cap (`max_base_jobs`).
        max: u32,
    },

    /// A transition left more live trees than the forest bound allows.
    #[error("forest grew to {got} trees, exceeding the bound of {max}")]
    ForestOverflow {
        /// Trees after the transition.
        got: usize,
        /// `(depth + 1) * (delay + 1) + 1`.
        max: usize,
    },

    /// Arrivals at a merge slot did not match any legal pairing.
    #[error("invalid merge job at level {level}: {reason}")]
    InvalidMergeJob {
        /// Level of the offending slot (0 = root).
        level: u32,
        /// What went wrong.
        reason: &'static str,
    },

    /// Arrivals at a base slot did not match any legal pairing.
    #[error("invalid base job at leaf {position}: {reason}")]
    InvalidBaseJob {
        /// Leaf index, left to right.
        position: usize,
        /// What went wrong.
        reason: &'static str,
    },

    /// `next_k_jobs` asked for more jobs than are pending.
    #[error("insufficient work: requested {requested} jobs, {available} available")]
    InsufficientWork {
        /// Jobs requested.
        requested: usize,
        /// Jobs pending across the forest.
        available: usize,
    },
}

impl From<TreeError> for ScanError {
    fn from(err: TreeError) -> Self {
        match err {
            TreeError::InvalidMergeJob { level, reason } => Self::InvalidMergeJob { level, reason },
            TreeError::InvalidBaseJob { position, reason } => {
                Self::InvalidBaseJob { position, reason }
            }
        }
    }
}
