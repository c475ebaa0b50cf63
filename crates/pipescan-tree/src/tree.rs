// crates/pipescan-tree/src/tree.rs

//! The per-batch job tree.
//!
//! A [`Tree`] of depth `d` carries `2^d` base slots (the batch's leaves) and
//! `2^d - 1` merge slots stored level-by-level in a flat array: level `l`
//! occupies linear indices `2^l - 1 ..= 2^(l+1) - 2`, the root at index 0.
//!
//! Arrivals delivered by [`Tree::update`] enter at the root and descend
//! level-by-level; at each node the current left weight is the cut-point
//! deciding how many of the node's arrivals continue into the left child.
//! Level `update_level - 1` stores arriving merge values as the next round's
//! jobs, level `update_level` flips the producing slots to `Done`, and the
//! root merge completing at level 0 surfaces the tree's final value.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use thiserror::Error;

use crate::job::{AvailableJob, JobStatus, NewJob, SequenceNo};
use crate::slot::{BaseJob, BaseRecord, BaseSlot, MergeJob, MergeRecord, MergeSlot, Weight};

/// Invariant violations raised while applying arrivals to slots.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    /// Arrivals at a merge slot do not match any legal pairing.
    #[error("invalid merge job at level {level}: {reason}")]
    InvalidMergeJob {
        /// Level of the offending slot (0 = root).
        level: u32,
        /// What went wrong.
        reason: &'static str,
    },
    /// Arrivals at a base slot do not match any legal pairing.
    #[error("invalid base job at leaf {position}: {reason}")]
    InvalidBaseJob {
        /// Leaf index, left to right.
        position: usize,
        /// What went wrong.
        reason: &'static str,
    },
}

/// A perfectly balanced job tree of fixed depth.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tree<A, D> {
    depth: u32,
    /// `2^depth - 1` merge slots in level order, root first.
    merges: Vec<MergeSlot<A>>,
    /// `2^depth` base slots, left to right.
    bases: Vec<BaseSlot<D>>,
}

#[inline]
const fn level_offset(level: u32) -> usize {
    (1usize << level) - 1
}

#[inline]
const fn level_width(level: u32) -> usize {
    1usize << level
}

impl<A, D> Tree<A, D> {
    /// A fresh tree: all slots empty, level-`l` merges weighted
    /// `(2^(d-l-1), 2^(d-l-1))`, base slots weighted 1.
    #[must_use]
    pub fn empty(depth: u32) -> Self {
        let mut merges = Vec::with_capacity(level_offset(depth));
        for level in 0..depth {
            let w = 1u32 << (depth - level - 1);
            for _ in 0..level_width(level) {
                merges.push(MergeSlot::empty(w, w));
            }
        }
        let bases = (0..level_width(depth)).map(|_| BaseSlot::empty()).collect();
        Self { depth, merges, bases }
    }

    /// Tree depth `d`; the tree holds `2^d` base slots.
    #[inline]
    #[must_use]
    pub const fn depth(&self) -> u32 {
        self.depth
    }

    /// Base-job equivalents still owed before the root can finalize.
    ///
    /// On a freshly reset tree this equals the number of `Todo` slots, i.e.
    /// the number of jobs the tree expects in its next service round.
    #[must_use]
    pub fn required_job_count(&self) -> u32 {
        if self.depth == 0 {
            self.bases[0].weight
        } else {
            self.merges[0].weight.total()
        }
    }

    /// Count of `Todo` slots anywhere in the tree.
    #[must_use]
    pub fn todo_job_count(&self) -> u32 {
        let m = self.merges.iter().filter(|s| s.is_todo()).count();
        let b = self.bases.iter().filter(|s| s.is_todo()).count();
        (m + b) as u32
    }

    /// Deterministic fold over every slot, merge levels top-down then the
    /// base row, left to right within each level.
    pub fn fold_depth<Acc, FM, FB>(&self, init: Acc, mut f_merge: FM, mut f_base: FB) -> Acc
    where
        FM: FnMut(Acc, u32, &MergeSlot<A>) -> Acc,
        FB: FnMut(Acc, &BaseSlot<D>) -> Acc,
    {
        let mut acc = init;
        for level in 0..self.depth {
            let off = level_offset(level);
            for slot in &self.merges[off..off + level_width(level)] {
                acc = f_merge(acc, level, slot);
            }
        }
        for slot in &self.bases {
            acc = f_base(acc, slot);
        }
        acc
    }

    /// Structurally map slot payloads, preserving weights, sequence numbers
    /// and statuses.
    pub fn map_depth<B, C, FM, FB>(&self, mut f_merge: FM, mut f_base: FB) -> Tree<B, C>
    where
        FM: FnMut(u32, &A) -> B,
        FB: FnMut(&D) -> C,
    {
        let mut merges = Vec::with_capacity(self.merges.len());
        for level in 0..self.depth {
            let off = level_offset(level);
            for slot in &self.merges[off..off + level_width(level)] {
                let job = match &slot.job {
                    MergeJob::Empty => MergeJob::Empty,
                    MergeJob::Part(a) => MergeJob::Part(f_merge(level, a)),
                    MergeJob::Full(r) => MergeJob::Full(MergeRecord {
                        left: f_merge(level, &r.left),
                        right: f_merge(level, &r.right),
                        seq_no: r.seq_no,
                        status: r.status,
                    }),
                };
                merges.push(MergeSlot { weight: slot.weight, job });
            }
        }
        let bases = self
            .bases
            .iter()
            .map(|slot| BaseSlot {
                weight: slot.weight,
                job: match &slot.job {
                    BaseJob::Empty => BaseJob::Empty,
                    BaseJob::Full(r) => BaseJob::Full(BaseRecord {
                        job: f_base(&r.job),
                        seq_no: r.seq_no,
                        status: r.status,
                    }),
                },
            })
            .collect();
        Tree { depth: self.depth, merges, bases }
    }

    /// Recompute every weight bottom-up from current slot statuses.
    ///
    /// A `Todo` base contributes one owed job. A `Todo` merge is forced to
    /// `(1, 0)`: it needs exactly one completion next round regardless of
    /// its subtree, and masks nothing below it since its children are
    /// already `Done`. Everything else adopts the sum of its children.
    pub fn reset_weights(&mut self) {
        let mut contrib: Vec<Weight> = self
            .bases
            .iter_mut()
            .map(|slot| {
                if slot.is_todo() {
                    slot.weight = 1;
                    Weight::new(1, 0)
                } else {
                    slot.weight = 0;
                    Weight::new(0, 0)
                }
            })
            .collect();
        for level in (0..self.depth).rev() {
            let off = level_offset(level);
            let mut next = Vec::with_capacity(level_width(level));
            for (i, slot) in self.merges[off..off + level_width(level)].iter_mut().enumerate() {
                let w = if slot.is_todo() {
                    Weight::new(1, 0)
                } else {
                    Weight::new(contrib[2 * i].total(), contrib[2 * i + 1].total())
                };
                slot.weight = w;
                next.push(w);
            }
            contrib = next;
        }
    }
}

impl<A: Clone, D: Clone> Tree<A, D> {
    /// Every schedulable job on one level: `Full`+`Todo` merges for interior
    /// levels, `Todo` bases when `level == depth`. Left-to-right order.
    #[must_use]
    pub fn jobs_on_level(&self, level: u32) -> Vec<AvailableJob<A, D>> {
        if level > self.depth {
            return Vec::new();
        }
        if level == self.depth {
            self.bases
                .iter()
                .filter_map(|slot| match &slot.job {
                    BaseJob::Full(r) if r.status == JobStatus::Todo => {
                        Some(AvailableJob::Base(r.job.clone()))
                    }
                    _ => None,
                })
                .collect()
        } else {
            let off = level_offset(level);
            self.merges[off..off + level_width(level)]
                .iter()
                .filter_map(|slot| match &slot.job {
                    MergeJob::Full(r) if r.status == JobStatus::Todo => Some(AvailableJob::Merge {
                        left: r.left.clone(),
                        right: r.right.clone(),
                    }),
                    _ => None,
                })
                .collect()
        }
    }

    /// All base jobs of this tree (the batch's own leaves).
    #[must_use]
    pub fn base_available_jobs(&self) -> Vec<AvailableJob<A, D>> {
        self.jobs_on_level(self.depth)
    }

    /// Every admitted base datum in admission order, regardless of status.
    #[must_use]
    pub fn base_data(&self) -> Vec<D> {
        self.bases
            .iter()
            .filter_map(|slot| match &slot.job {
                BaseJob::Full(r) => Some(r.job.clone()),
                BaseJob::Empty => None,
            })
            .collect()
    }

    /// Apply one round's arrivals targeted at `update_level`.
    ///
    /// Returns the tree's final value when the arrival completes the root
    /// merge. Invalid (arrivals, slot) pairings abort with an error; the
    /// caller is expected to discard the tree state in that case.
    pub fn update(
        &mut self,
        jobs: &[NewJob<A, D>],
        update_level: u32,
        seq_no: SequenceNo,
    ) -> Result<Option<A>, TreeError> {
        if update_level > self.depth {
            return Err(TreeError::InvalidMergeJob {
                level: update_level,
                reason: "no such level in this tree",
            });
        }
        let mut emitted = None;
        let mut slices: Vec<&[NewJob<A, D>]> = vec![jobs];
        for level in 0..=update_level {
            if level == self.depth {
                self.fill_bases(&slices, seq_no, &mut emitted)?;
                break;
            }
            let completing = level == update_level;
            let storing = level + 1 == update_level;
            let off = level_offset(level);
            let mut next: Vec<&[NewJob<A, D>]> = Vec::with_capacity(slices.len() * 2);
            for (i, s) in slices.iter().enumerate() {
                let slot = &mut self.merges[off + i];
                let Weight { left: wl, right: wr } = slot.weight;
                if completing {
                    match (*s, &mut slot.job) {
                        ([], _) => {}
                        ([NewJob::Merge(a)], MergeJob::Full(r))
                            if r.status == JobStatus::Todo =>
                        {
                            r.status = JobStatus::Done;
                            if level == 0 {
                                emitted = Some(a.clone());
                                slot.weight = Weight::new(0, 0);
                            }
                        }
                        _ => {
                            return Err(TreeError::InvalidMergeJob {
                                level,
                                reason: "arrival does not complete a scheduled merge",
                            })
                        }
                    }
                    continue;
                }
                if s.len() as u32 > wl + wr {
                    return Err(TreeError::InvalidMergeJob {
                        level,
                        reason: "more arrivals than the subtree owes",
                    });
                }
                if storing {
                    match (*s, &mut slot.job) {
                        ([], _)
                        | ([NewJob::Base(_)], MergeJob::Empty)
                        | ([NewJob::Base(_), NewJob::Base(_)], MergeJob::Empty) => {}
                        ([NewJob::Merge(a), NewJob::Merge(b)], j @ MergeJob::Empty) => {
                            *j = MergeJob::Full(MergeRecord {
                                left: a.clone(),
                                right: b.clone(),
                                seq_no,
                                status: JobStatus::Todo,
                            });
                        }
                        ([NewJob::Merge(a)], j @ MergeJob::Empty) => {
                            *j = MergeJob::Part(a.clone());
                        }
                        ([NewJob::Merge(b)], j @ MergeJob::Part(_)) => {
                            let MergeJob::Part(a) = std::mem::replace(j, MergeJob::Empty) else {
                                unreachable!("matched Part above")
                            };
                            *j = MergeJob::Full(MergeRecord {
                                left: a,
                                right: b.clone(),
                                seq_no,
                                status: JobStatus::Todo,
                            });
                        }
                        _ => {
                            return Err(TreeError::InvalidMergeJob {
                                level,
                                reason: "arrivals do not pair with the slot state",
                            })
                        }
                    }
                }
                // Weight accounting: arrivals drain the left side first.
                let used_left = (s.len() as u32).min(wl);
                let used_right = (s.len() as u32 - used_left).min(wr);
                slot.weight = Weight::new(wl - used_left, wr - used_right);
                // Descend with the pre-update left weight as the cut-point.
                let cut = s.len().min(wl as usize);
                next.push(&s[..cut]);
                next.push(&s[cut..]);
            }
            slices = next;
        }
        Ok(emitted)
    }

    fn fill_bases(
        &mut self,
        slices: &[&[NewJob<A, D>]],
        seq_no: SequenceNo,
        emitted: &mut Option<A>,
    ) -> Result<(), TreeError> {
        let depth = self.depth;
        for (i, s) in slices.iter().enumerate() {
            let slot = &mut self.bases[i];
            match (*s, &mut slot.job) {
                ([], _) => {}
                ([NewJob::Base(d)], j @ BaseJob::Empty) => {
                    *j = BaseJob::Full(BaseRecord {
                        job: d.clone(),
                        seq_no,
                        status: JobStatus::Todo,
                    });
                    slot.weight = 0;
                }
                ([NewJob::Merge(a)], BaseJob::Full(r)) if r.status == JobStatus::Todo => {
                    r.status = JobStatus::Done;
                    if depth == 0 {
                        *emitted = Some(a.clone());
                    }
                }
                _ => {
                    return Err(TreeError::InvalidBaseJob {
                        position: i,
                        reason: "arrival does not fill or complete this leaf",
                    })
                }
            }
        }
        Ok(())
    }
}

impl<A, D> Tree<A, D> {
    /// Human-readable rendering, one line per level.
    pub fn view<FA, FD>(&self, show_a: FA, show_d: FD) -> String
    where
        FA: Fn(&A) -> String,
        FD: Fn(&D) -> String,
    {
        let mut out = String::new();
        for level in 0..self.depth {
            let off = level_offset(level);
            let _ = write!(out, "L{level}:");
            for slot in &self.merges[off..off + level_width(level)] {
                let body = match &slot.job {
                    MergeJob::Empty => "_".to_owned(),
                    MergeJob::Part(a) => format!("P({})", show_a(a)),
                    MergeJob::Full(r) => format!(
                        "{}({},{})#{}",
                        match r.status {
                            JobStatus::Todo => "T",
                            JobStatus::Done => "D",
                        },
                        show_a(&r.left),
                        show_a(&r.right),
                        r.seq_no
                    ),
                };
                let _ = write!(out, " ({},{}){body}", slot.weight.left, slot.weight.right);
            }
            out.push('\n');
        }
        let _ = write!(out, "L{}:", self.depth);
        for slot in &self.bases {
            let body = match &slot.job {
                BaseJob::Empty => "_".to_owned(),
                BaseJob::Full(r) => format!(
                    "{}({})#{}",
                    match r.status {
                        JobStatus::Todo => "T",
                        JobStatus::Done => "D",
                    },
                    show_d(&r.job),
                    r.seq_no
                ),
            };
            let _ = write!(out, " ({}){body}", slot.weight);
        }
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merge_weights(t: &Tree<u64, u64>) -> Vec<(u32, u32)> {
        t.fold_depth(
            Vec::new(),
            |mut acc, _, m| {
                acc.push((m.weight.left, m.weight.right));
                acc
            },
            |acc, _| acc,
        )
    }

    fn bases(data: &[u64]) -> Vec<NewJob<u64, u64>> {
        data.iter().map(|d| NewJob::Base(*d)).collect()
    }

    fn merges(vals: &[u64]) -> Vec<NewJob<u64, u64>> {
        vals.iter().map(|a| NewJob::Merge(*a)).collect()
    }

    #[test]
    fn empty_tree_has_level_derived_weights() {
        let t: Tree<u64, u64> = Tree::empty(3);
        assert_eq!(t.required_job_count(), 8);
        let w = merge_weights(&t);
        assert_eq!(w[0], (4, 4));
        assert_eq!(&w[1..3], &[(2, 2), (2, 2)]);
        assert_eq!(&w[3..7], &[(1, 1); 4]);
    }

    #[test]
    fn full_lifecycle_depth_two() {
        let mut t: Tree<u64, u64> = Tree::empty(2);

        // Round 1: admit the batch.
        assert_eq!(t.update(&bases(&[1, 2, 3, 4]), 2, 1).unwrap(), None);
        assert_eq!(t.required_job_count(), 0);
        assert_eq!(
            t.jobs_on_level(2),
            vec![
                AvailableJob::Base(1),
                AvailableJob::Base(2),
                AvailableJob::Base(3),
                AvailableJob::Base(4)
            ]
        );
        t.reset_weights();
        assert_eq!(t.required_job_count(), 4);
        assert_eq!(t.todo_job_count(), 4);

        // Round 2: base completions create the level-1 merges.
        assert_eq!(t.update(&merges(&[1, 2, 3, 4]), 2, 2).unwrap(), None);
        t.reset_weights();
        assert_eq!(t.required_job_count(), 2);
        assert_eq!(
            t.jobs_on_level(1),
            vec![
                AvailableJob::Merge { left: 1, right: 2 },
                AvailableJob::Merge { left: 3, right: 4 }
            ]
        );

        // Round 3: level-1 completions create the root merge.
        assert_eq!(t.update(&merges(&[3, 7]), 1, 3).unwrap(), None);
        t.reset_weights();
        assert_eq!(t.required_job_count(), 1);
        assert_eq!(t.jobs_on_level(0), vec![AvailableJob::Merge { left: 3, right: 7 }]);

        // Round 4: the root completion surfaces the batch value.
        assert_eq!(t.update(&merges(&[10]), 0, 4).unwrap(), Some(10));
        assert_eq!(t.required_job_count(), 0);
        assert_eq!(t.base_data(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn partial_fill_routes_by_weight() {
        let mut t: Tree<u64, u64> = Tree::empty(1);
        t.update(&bases(&[5, 6]), 1, 1).unwrap();
        t.reset_weights();

        // Only the left base completes; its value parks as a Part.
        t.update(&merges(&[5]), 1, 2).unwrap();
        assert_eq!(merge_weights(&t), vec![(0, 1)]);
        t.reset_weights();
        assert_eq!(merge_weights(&t), vec![(0, 1)]);
        assert_eq!(t.jobs_on_level(1), vec![AvailableJob::Base(6)]);

        // The right completion pairs with the parked Part.
        t.update(&merges(&[6]), 1, 3).unwrap();
        t.reset_weights();
        assert_eq!(t.jobs_on_level(0), vec![AvailableJob::Merge { left: 5, right: 6 }]);
        assert_eq!(t.update(&merges(&[11]), 0, 4).unwrap(), Some(11));
    }

    #[test]
    fn staged_base_fills_decrement_interior_weights() {
        let mut t: Tree<u64, u64> = Tree::empty(2);
        t.update(&bases(&[1]), 2, 1).unwrap();
        assert_eq!(t.required_job_count(), 3);
        t.update(&bases(&[2, 3]), 2, 2).unwrap();
        assert_eq!(t.required_job_count(), 1);
        t.update(&bases(&[4]), 2, 3).unwrap();
        assert_eq!(t.required_job_count(), 0);
        assert_eq!(t.base_data(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn reset_weights_is_idempotent() {
        let mut t: Tree<u64, u64> = Tree::empty(2);
        t.update(&bases(&[1, 2, 3]), 2, 1).unwrap();
        t.reset_weights();
        let once = t.clone();
        t.reset_weights();
        assert_eq!(t, once);
    }

    #[test]
    fn invalid_pairings_are_rejected() {
        let mut t: Tree<u64, u64> = Tree::empty(1);
        t.update(&bases(&[5, 6]), 1, 1).unwrap();

        // Completing a merge that was never scheduled.
        let err = t.clone().update(&merges(&[9]), 0, 2).unwrap_err();
        assert!(matches!(err, TreeError::InvalidMergeJob { level: 0, .. }));

        // More arrivals than the tree owes.
        t.reset_weights();
        let err = t.update(&merges(&[5, 6, 7]), 1, 2).unwrap_err();
        assert!(matches!(err, TreeError::InvalidMergeJob { .. }));

        // A completion for a leaf that was never filled.
        let mut t: Tree<u64, u64> = Tree::empty(0);
        let err = t.update(&merges(&[9]), 0, 1).unwrap_err();
        assert!(matches!(err, TreeError::InvalidBaseJob { .. }));
    }

    #[test]
    fn completing_a_done_leaf_is_rejected() {
        let mut t: Tree<u64, u64> = Tree::empty(0);
        t.update(&bases(&[42]), 0, 1).unwrap();
        t.reset_weights();
        assert_eq!(t.update(&merges(&[42]), 0, 2).unwrap(), Some(42));
        t.reset_weights();
        let err = t.update(&merges(&[42]), 0, 3).unwrap_err();
        assert!(matches!(err, TreeError::InvalidBaseJob { .. }));
    }

    #[test]
    fn depth_zero_tree_emits_on_base_completion() {
        let mut t: Tree<u64, u64> = Tree::empty(0);
        assert_eq!(t.required_job_count(), 1);
        t.update(&bases(&[42]), 0, 1).unwrap();
        t.reset_weights();
        assert_eq!(t.update(&merges(&[42]), 0, 2).unwrap(), Some(42));
    }

    #[test]
    fn map_depth_preserves_structure() {
        let mut t: Tree<u64, u64> = Tree::empty(1);
        t.update(&bases(&[5, 6]), 1, 1).unwrap();
        t.reset_weights();
        t.update(&merges(&[5]), 1, 2).unwrap();

        let mapped: Tree<String, String> =
            t.map_depth(|level, a| format!("{level}:{a}"), |d| format!("d{d}"));
        assert_eq!(mapped.required_job_count(), t.required_job_count());
        assert_eq!(mapped.base_data(), vec!["d5".to_owned(), "d6".to_owned()]);
    }

    #[test]
    fn view_renders_one_line_per_level() {
        let mut t: Tree<u64, u64> = Tree::empty(1);
        t.update(&bases(&[5]), 1, 1).unwrap();
        let s = t.view(|a| a.to_string(), |d| d.to_string());
        assert_eq!(s.lines().count(), 2);
        assert!(s.contains("T(5)#1"));
    }

    #[test]
    fn slots_carry_the_round_that_recorded_them() {
        let mut t: Tree<u64, u64> = Tree::empty(1);
        t.update(&bases(&[5, 6]), 1, 7).unwrap();
        t.reset_weights();
        t.update(&merges(&[5, 6]), 1, 8).unwrap();

        let base_seqs = t.fold_depth(
            Vec::new(),
            |acc, _, _| acc,
            |mut acc, slot| {
                if let BaseJob::Full(r) = &slot.job {
                    acc.push(r.seq_no);
                }
                acc
            },
        );
        assert_eq!(base_seqs, vec![7, 7]);

        let merge_seqs = t.fold_depth(
            Vec::new(),
            |mut acc, _, slot| {
                if let MergeJob::Full(r) = &slot.job {
                    acc.push(r.seq_no);
                }
                acc
            },
            |acc, _| acc,
        );
        assert_eq!(merge_seqs, vec![8]);
    }

    #[test]
    fn serde_roundtrip() {
        let mut t: Tree<u64, u64> = Tree::empty(2);
        t.update(&bases(&[1, 2, 3]), 2, 1).unwrap();
        let json = serde_json::to_string(&t).unwrap();
        let back: Tree<u64, u64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }
}
