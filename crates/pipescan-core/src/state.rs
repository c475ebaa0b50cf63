// crates/pipescan-core/src/state.rs

//! The scan forest: an ordered, non-empty sequence of per-batch trees at
//! staggered stages of completion, plus round bookkeeping.
//!
//! The front of the deque is the *current* tree: newest, least complete,
//! the only one that accepts base data. Trees behind it receive merge work
//! in their service rounds and retire from wherever their root completes.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use anyhow::{ensure, Result};
use pipescan_tree::{ceil_log2, AvailableJob, BaseJob, MergeJob, SequenceNo, Tree};

/// How an incoming batch would be split across the current tree and a
/// successor: `first` slots fit on the current tree, `second` slots would
/// land on a freshly spawned one.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpacePartition {
    /// Free base slots on the current tree.
    pub first: u32,
    /// Capacity a successor tree would have to absorb, when the current
    /// tree cannot take a full batch.
    pub second: Option<u32>,
}

/// The live forest plus round bookkeeping.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ScanState<A, D> {
    /// Non-empty; front is the current (newest) tree.
    pub(crate) trees: VecDeque<Tree<A, D>>,
    /// Last emitted root value and the base data that produced it.
    pub(crate) acc: Option<(A, Vec<D>)>,
    /// Bumped once per round; stamped on every slot mutated in that round.
    pub(crate) curr_job_seq_no: SequenceNo,
    /// Hard cap on base jobs per tree (a power of two).
    pub(crate) max_base_jobs: u32,
    /// Rounds of slack between successive work slices per tree level.
    pub(crate) delay: u32,
    /// Base data admitted to the current tree so far.
    pub(crate) recent_tree_data: Vec<D>,
    /// Base data of the not-yet-emitted tail trees, newest first; entry `k`
    /// belongs to the tree at tail position `k`.
    pub(crate) other_trees_data: VecDeque<Vec<D>>,
}

impl<A, D> ScanState<A, D> {
    /// A one-tree forest with level-derived initial weights.
    ///
    /// `max_base_jobs` below the next power of two is rounded up so every
    /// tree stays perfectly balanced.
    ///
    /// # Panics
    ///
    /// Panics if `max_base_jobs == 0`.
    #[must_use]
    pub fn empty(max_base_jobs: u32, delay: u32) -> Self {
        assert!(max_base_jobs >= 1, "max_base_jobs must be at least 1");
        let max_base_jobs = max_base_jobs.next_power_of_two();
        let depth = ceil_log2(max_base_jobs);
        let mut trees = VecDeque::with_capacity(1);
        trees.push_front(Tree::empty(depth));
        Self {
            trees,
            acc: None,
            curr_job_seq_no: 0,
            max_base_jobs,
            delay,
            recent_tree_data: Vec::new(),
            other_trees_data: VecDeque::new(),
        }
    }

    /// Tree depth shared by the whole forest.
    #[inline]
    #[must_use]
    pub fn depth(&self) -> u32 {
        ceil_log2(self.max_base_jobs)
    }

    /// Per-round base-data cap, which is also each tree's leaf count.
    #[inline]
    #[must_use]
    pub const fn max_base_jobs(&self) -> u32 {
        self.max_base_jobs
    }

    /// Rounds of slack between successive work slices per tree level.
    #[inline]
    #[must_use]
    pub const fn delay(&self) -> u32 {
        self.delay
    }

    /// Per-round admission capacity (independent of fill state).
    #[inline]
    #[must_use]
    pub const fn free_space(&self) -> u32 {
        self.max_base_jobs
    }

    /// Upper bound on live trees: `(depth + 1) * (delay + 1) + 1`.
    #[must_use]
    pub fn max_trees(&self) -> usize {
        ((self.depth() + 1) * (self.delay + 1)) as usize + 1
    }

    /// Number of live trees.
    #[inline]
    #[must_use]
    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// The round counter.
    #[inline]
    #[must_use]
    pub const fn current_job_sequence_number(&self) -> SequenceNo {
        self.curr_job_seq_no
    }

    pub(crate) fn head(&self) -> &Tree<A, D> {
        &self.trees[0]
    }

    /// Free base slots on the current tree.
    #[must_use]
    pub fn free_space_on_current_tree(&self) -> u32 {
        self.head().required_job_count()
    }

    /// Whether the next admitted batch starts on a completely empty tree.
    #[must_use]
    pub fn next_on_new_tree(&self) -> bool {
        self.free_space_on_current_tree() == self.max_base_jobs
    }

    /// How an incoming batch would split across the current tree and a
    /// successor.
    #[must_use]
    pub fn partition_if_overflowing(&self) -> SpacePartition {
        let free = self.free_space_on_current_tree();
        let max = self.max_base_jobs;
        SpacePartition {
            first: free.min(max),
            second: (free < max).then(|| max - free),
        }
    }

    /// Last emitted root value with the base data of its batch.
    #[inline]
    #[must_use]
    pub fn last_emitted_result(&self) -> Option<&(A, Vec<D>)> {
        self.acc.as_ref()
    }

    /// Audit the forest's structural bookkeeping.
    ///
    /// Checks the forest bound, the data-log alignment, and that the current
    /// tree is exactly as far along as its weights claim. Intended for tests
    /// and debug assertions; every `update` maintains these by construction.
    pub fn check_invariants(&self) -> Result<()> {
        ensure!(!self.trees.is_empty(), "forest must keep at least one tree");
        ensure!(
            self.trees.len() <= self.max_trees(),
            "forest holds {} trees, bound is {}",
            self.trees.len(),
            self.max_trees()
        );
        ensure!(
            self.other_trees_data.len() == self.trees.len() - 1,
            "data log holds {} entries for {} tail trees",
            self.other_trees_data.len(),
            self.trees.len() - 1
        );
        let depth = self.depth();
        for (i, tree) in self.trees.iter().enumerate() {
            ensure!(
                tree.depth() == depth,
                "tree {i} has depth {}, forest depth is {depth}",
                tree.depth()
            );
            ensure!(
                tree.required_job_count() <= self.max_base_jobs,
                "tree {i} owes {} jobs, more than a full batch",
                tree.required_job_count()
            );
        }
        let head = self.head();
        let empty_bases = head.fold_depth(
            0u32,
            |acc, _, _| acc,
            |acc, slot| acc + u32::from(matches!(slot.job, BaseJob::Empty)),
        );
        ensure!(
            head.required_job_count() == empty_bases,
            "current tree owes {} jobs but has {} empty leaves",
            head.required_job_count(),
            empty_bases
        );
        let head_merges_untouched = head.fold_depth(
            true,
            |acc, _, slot| acc && matches!(slot.job, MergeJob::Empty),
            |acc, _| acc,
        );
        ensure!(
            head_merges_untouched,
            "current tree received merge work before entering the tail"
        );
        ensure!(
            self.recent_tree_data.len() as u32 == self.max_base_jobs - head.required_job_count(),
            "recent data log out of step with the current tree"
        );
        Ok(())
    }
}

impl<A: Clone, D: Clone> ScanState<A, D> {
    /// Uncompleted base jobs on the current tree, in admission order.
    #[must_use]
    pub fn base_jobs_on_latest_tree(&self) -> Vec<D> {
        self.head()
            .base_available_jobs()
            .into_iter()
            .filter_map(|job| match job {
                AvailableJob::Base(d) => Some(d),
                AvailableJob::Merge { .. } => None,
            })
            .collect()
    }
}
