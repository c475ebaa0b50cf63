// crates/pipescan-core/src/lib.rs

//! pipescan-core — the pipelined parallel-scan forest.
//!
//! A [`ScanState`] admits a bounded batch of base work per round, combines
//! batches pairwise through staggered merge rounds, and emits one aggregated
//! value per batch in admission order. This crate carries:
//! - the forest and its round bookkeeping ([`state`]),
//! - the work scheduler ([`scheduler`]),
//! - the round updater and transition harness ([`update`]),
//! - JSON/CBOR state round-tripping ([`io`]).
//!
//! ```
//! use pipescan_core::prelude::*;
//!
//! let state: ScanState<u64, u64> = ScanState::empty(2, 0);
//! let (emitted, state) = state.update(&[3, 5], &[]).unwrap();
//! assert_eq!(emitted, None);
//! assert_eq!(state.next_jobs().len(), 2);
//! ```

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

/// Error kinds surfaced by forest transitions.
pub mod error;
/// JSON/CBOR helpers and auto-detecting read/write APIs.
pub mod io;
/// Work enumeration: per-round selection, overflow extension, full census.
pub mod scheduler;
/// The forest value and its read API.
pub mod state;
/// The round updater and transition harness.
pub mod update;

pub use crate::error::ScanError;
pub use crate::state::{ScanState, SpacePartition};

// Re-export the tree vocabulary so callers need a single import path.
pub use pipescan_tree::{AvailableJob, JobStatus, NewJob, SequenceNo, Tree, TreeError};

/// Commonly-used items for quick imports.
///
/// ```rust
/// use pipescan_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::ScanError;
    pub use crate::state::{ScanState, SpacePartition};
    pub use pipescan_tree::{AvailableJob, SequenceNo, Tree};
}
