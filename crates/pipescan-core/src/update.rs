// crates/pipescan-core/src/update.rs

//! The round updater and its transition harness.
//!
//! One round: split the incoming data and completed jobs between the current
//! tree and (on overflow) a freshly spawned one, deliver merge completions to
//! the in-service tail trees, admit base data, retire the tree whose root
//! finalized, and re-derive weights for the next round. The public
//! [`ScanState::update`] applies all of it to a working copy, so a failed
//! round leaves the caller's forest untouched.

use tracing::{debug, trace};

use pipescan_tree::{NewJob, Tree};

use crate::error::ScanError;
use crate::scheduler::WorkSet;
use crate::state::ScanState;

impl<A: Clone, D: Clone> ScanState<A, D> {
    /// Apply one round.
    ///
    /// `completed_jobs` must be the results of (a prefix of) the jobs
    /// enumerated by [`ScanState::jobs_for_next_update`] for this round, in
    /// enumeration order. Returns the root value emitted this round, if any,
    /// alongside the advanced forest.
    pub fn update(
        &self,
        data: &[D],
        completed_jobs: &[A],
    ) -> Result<(Option<A>, Self), ScanError> {
        let mut next = self.clone();
        let emitted = next.apply_round(data, completed_jobs)?;
        Ok((emitted, next))
    }

    fn apply_round(&mut self, data: &[D], completed_jobs: &[A]) -> Result<Option<A>, ScanError> {
        if data.len() > self.max_base_jobs() as usize {
            return Err(ScanError::DataCountExceeded {
                got: data.len(),
                max: self.max_base_jobs(),
            });
        }
        self.curr_job_seq_no += 1;
        trace!(
            seq_no = self.curr_job_seq_no,
            data = data.len(),
            jobs = completed_jobs.len(),
            trees = self.trees.len(),
            "applying round"
        );

        let free = self.free_space_on_current_tree() as usize;
        let (data_now, data_overflow) = data.split_at(free.min(data.len()));
        let required = self.work_for_set(WorkSet::Current).len();
        let (jobs_now, jobs_overflow) = completed_jobs.split_at(required.min(completed_jobs.len()));

        let emitted_first = self.add_merge_jobs(jobs_now)?;
        self.add_data(data_now)?;
        // Overflow pass: the spawn above re-staggered the tail.
        let emitted_second = self.add_merge_jobs(jobs_overflow)?;
        self.add_data(data_overflow)?;

        if self.trees.len() > self.max_trees() {
            return Err(ScanError::ForestOverflow {
                got: self.trees.len(),
                max: self.max_trees(),
            });
        }

        Ok(match emitted_first.or(emitted_second) {
            Some((value, batch)) => {
                self.acc = Some((value.clone(), batch));
                Some(value)
            }
            None => None,
        })
    }

    /// Deliver completed jobs to the in-service tail trees.
    ///
    /// Each selected tree consumes as many jobs as its weights still owe,
    /// one level higher per selection step. The first root completion ends
    /// delivery; the finished tree retires together with its data-log entry.
    fn add_merge_jobs(&mut self, jobs: &[A]) -> Result<Option<(A, Vec<D>)>, ScanError> {
        if jobs.is_empty() {
            return Ok(None);
        }
        let depth = self.depth();
        let stride = (self.delay() + 1) as usize;
        let required_this_round = self.work_for_set(WorkSet::Current).len();
        let seq_no = self.curr_job_seq_no;

        let mut remaining = jobs;
        let mut emitted: Option<(A, Vec<D>)> = None;
        let mut retire: Option<usize> = None;
        let mut pos = 0u32;
        for i in 1..self.trees.len() {
            if emitted.is_some() {
                break;
            }
            let tail_idx = i - 1;
            if tail_idx % stride != stride - 1 {
                continue;
            }
            if pos > depth {
                break;
            }
            let update_level = depth - pos;
            pos += 1;

            let tree = &mut self.trees[i];
            let need = (tree.required_job_count() as usize).min(remaining.len());
            let (slice, rest) = remaining.split_at(need);
            remaining = rest;
            if slice.is_empty() {
                continue;
            }
            let arrivals: Vec<NewJob<A, D>> =
                slice.iter().cloned().map(NewJob::Merge).collect();
            trace!(tail_idx, update_level, jobs = arrivals.len(), "delivering merge work");
            if let Some(value) = tree.update(&arrivals, update_level, seq_no)? {
                debug!(seq_no, tail_idx, "root merge finalized, retiring tree");
                emitted = Some((value, tree.base_data()));
                retire = Some(i);
            }
        }

        if let Some(i) = retire {
            self.trees.remove(i);
            self.other_trees_data.remove(i - 1);
        }
        if emitted.is_some()
            || (self.trees.len() < self.max_trees() && jobs.len() == required_this_round)
        {
            for tree in self.trees.iter_mut().skip(1) {
                tree.reset_weights();
            }
        }
        Ok(emitted)
    }

    /// Admit base data onto the current tree; spawn a fresh tree when the
    /// batch fills it.
    fn add_data(&mut self, data: &[D]) -> Result<(), ScanError> {
        if data.is_empty() {
            return Ok(());
        }
        let depth = self.depth();
        let seq_no = self.curr_job_seq_no;
        let available = self.trees[0].required_job_count() as usize;
        let arrivals: Vec<NewJob<A, D>> = data.iter().cloned().map(NewJob::Base).collect();
        self.trees[0].update(&arrivals, depth, seq_no)?;
        self.recent_tree_data.extend(data.iter().cloned());
        if data.len() == available {
            self.trees[0].reset_weights();
            self.trees.push_front(Tree::empty(depth));
            self.other_trees_data
                .push_front(std::mem::take(&mut self.recent_tree_data));
            debug!(seq_no, trees = self.trees.len(), "current tree filled, spawned successor");
        }
        Ok(())
    }
}
