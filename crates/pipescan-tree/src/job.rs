// crates/pipescan-tree/src/job.rs

//! Job vocabulary shared by the tree and the forest that schedules it.

use serde::{Deserialize, Serialize};

/// Per-round monotonic counter stamped on every slot mutated in a round.
pub type SequenceNo = u64;

/// Lifecycle of a filled slot. Transitions strictly `Todo -> Done`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobStatus {
    /// Work has been recorded in the slot but not yet completed.
    Todo,
    /// The slot's work is complete; its payload is frozen until consumed.
    Done,
}

/// A unit of work exposed to external workers.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum AvailableJob<A, D> {
    /// A base datum awaiting processing.
    Base(D),
    /// Two child values awaiting combination.
    Merge {
        /// Left child value.
        left: A,
        /// Right child value.
        right: A,
    },
}

/// An arrival delivered to the tree by one round of `update`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum NewJob<A, D> {
    /// A fresh base datum to be stored in a leaf.
    Base(D),
    /// The result of a completed job, routed to its slot and its parent.
    Merge(A),
}
