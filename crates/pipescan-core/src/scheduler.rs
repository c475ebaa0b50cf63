// crates/pipescan-core/src/scheduler.rs

//! Round scheduling: which jobs must be completed, and when.
//!
//! Tail trees are serviced on a stride of `delay + 1`: the tree at tail
//! position `i` is selected when `i mod (delay + 1) = delay`, and the `j`-th
//! selected tree surrenders its jobs one level higher than its predecessor
//! (`depth - j`, down to the root). At most `depth + 1` trees are in service
//! per round, so at steady state one root completes per round and exactly
//! `2 * max_base_jobs - 1` jobs are pending.

use pipescan_tree::{AvailableJob, Tree};

use crate::error::ScanError;
use crate::state::ScanState;

/// Which forest slice a work enumeration covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WorkSet {
    /// The tail as it stands this round.
    Current,
    /// The whole forest, as the tail will look once the current tree fills.
    Next,
}

impl<A: Clone, D: Clone> ScanState<A, D> {
    pub(crate) fn work_for_set(&self, set: WorkSet) -> Vec<AvailableJob<A, D>> {
        let depth = self.depth();
        let stride = (self.delay() + 1) as usize;
        let skip = match set {
            WorkSet::Current => 1,
            WorkSet::Next => 0,
        };
        self.trees
            .iter()
            .skip(skip)
            .enumerate()
            .filter(|(i, _)| i % stride == stride - 1)
            .take(depth as usize + 1)
            .enumerate()
            .flat_map(|(j, (_, tree))| tree.jobs_on_level(depth - j as u32))
            .collect()
    }

    /// The jobs that must be completed so the next round advances every
    /// in-service tree in lockstep.
    #[must_use]
    pub fn work_for_current_tree(&self) -> Vec<AvailableJob<A, D>> {
        self.work_for_set(WorkSet::Current)
    }

    /// The jobs an `update` carrying `data_count` base items will consume:
    /// the current round's work, extended with up to
    /// `2 * (data_count - free_space)` jobs from the post-spawn selection
    /// when the batch overflows the current tree.
    #[must_use]
    pub fn jobs_for_next_update(&self, data_count: usize) -> Vec<AvailableJob<A, D>> {
        let free = self.free_space_on_current_tree() as usize;
        let count = data_count.min(self.max_base_jobs() as usize);
        let mut jobs = self.work_for_set(WorkSet::Current);
        if count > free {
            jobs.extend(
                self.work_for_set(WorkSet::Next)
                    .into_iter()
                    .take((count - free) * 2),
            );
        }
        jobs
    }

    /// The full census of pending jobs, grouped by the virtual round in
    /// which the selection window reaches them.
    ///
    /// Each group re-runs the round selection over a forest extended by one
    /// more empty tree, which walks the staggered window across every live
    /// tree exactly once and ends on the current tree's base row.
    #[must_use]
    pub fn all_work(&self) -> Vec<Vec<AvailableJob<A, D>>> {
        let depth = self.depth();
        let mut chunks = Vec::new();
        let set1 = self.work_for_set(WorkSet::Current);
        if !set1.is_empty() {
            chunks.push(set1);
        }
        let mut virt = self.clone();
        for _ in 0..=self.delay() {
            virt.trees.push_front(Tree::empty(depth));
            let work = virt.work_for_set(WorkSet::Current);
            if !work.is_empty() {
                chunks.push(work);
            }
        }
        chunks
    }

    /// Every pending job anywhere in the forest, flattened.
    #[must_use]
    pub fn next_jobs(&self) -> Vec<AvailableJob<A, D>> {
        self.all_work().into_iter().flatten().collect()
    }

    /// The first `k` pending jobs.
    pub fn next_k_jobs(&self, k: usize) -> Result<Vec<AvailableJob<A, D>>, ScanError> {
        let mut jobs = self.next_jobs();
        if k > jobs.len() {
            return Err(ScanError::InsufficientWork { requested: k, available: jobs.len() });
        }
        jobs.truncate(k);
        Ok(jobs)
    }
}
