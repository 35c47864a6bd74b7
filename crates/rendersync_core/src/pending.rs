//! # Pending State Table
//!
//! Per-target tri-state plus a re-render bit.
//!
//! ```text
//!   request          pass / forced          finish (no re-render)
//! Inactive ──────▶ Requested ──────▶ InProgress ──────────────▶ Inactive
//!                      ▲                 │
//!                      └─────────────────┘
//!                   finish with re-render bit
//! ```
//!
//! Absent entries are `Inactive`. Inactive entries are removed so the table
//! only ever holds targets with work attached.

use std::collections::HashMap;

use crate::target::TargetId;

/// Scheduling state of one target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum PendingState {
    /// Nothing to do.
    #[default]
    Inactive,
    /// A render was requested and waits for the next pass.
    Requested,
    /// The render action is working on this target.
    InProgress,
}

/// What a request did to the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Inactive -> Requested.
    Queued,
    /// Already requested; merged into the existing request.
    Coalesced,
    /// In progress; the target will be requested again once the render ends.
    Deferred,
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    state: PendingState,
    rerender: bool,
    /// Sequence number of the request that created the entry.
    seq: u64,
}

/// Pending state for every target with outstanding work.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: HashMap<TargetId, Entry>,
    /// Cached count of `Requested` entries.
    requested: usize,
    /// Cached count of `InProgress` entries.
    in_progress: usize,
    next_seq: u64,
}

impl PendingTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// State of a target.
    #[must_use]
    pub fn state(&self, target: TargetId) -> PendingState {
        self.entries
            .get(&target)
            .map_or(PendingState::Inactive, |e| e.state)
    }

    /// Returns true if a request arrived while the target was in progress.
    #[must_use]
    pub fn has_rerender(&self, target: TargetId) -> bool {
        self.entries.get(&target).is_some_and(|e| e.rerender)
    }

    /// Records a request for `target`.
    pub fn request(&mut self, target: TargetId) -> RequestOutcome {
        match self.entries.get_mut(&target) {
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.entries.insert(
                    target,
                    Entry {
                        state: PendingState::Requested,
                        rerender: false,
                        seq,
                    },
                );
                self.requested += 1;
                RequestOutcome::Queued
            }
            Some(entry) => match entry.state {
                PendingState::Requested => RequestOutcome::Coalesced,
                PendingState::InProgress => {
                    entry.rerender = true;
                    RequestOutcome::Deferred
                }
                PendingState::Inactive => {
                    // Inactive entries are removed eagerly; treat a stray one as absent.
                    entry.state = PendingState::Requested;
                    self.requested += 1;
                    RequestOutcome::Queued
                }
            },
        }
    }

    /// Moves a target into `InProgress`.
    ///
    /// Works from `Requested` (normal pass) and from `Inactive` (forced
    /// update). Returns false if the target is already in progress.
    pub fn begin(&mut self, target: TargetId) -> bool {
        let seq = self.next_seq;
        let entry = self.entries.entry(target).or_insert_with(|| Entry {
            state: PendingState::Inactive,
            rerender: false,
            seq,
        });
        match entry.state {
            PendingState::InProgress => false,
            PendingState::Requested => {
                entry.state = PendingState::InProgress;
                self.requested -= 1;
                self.in_progress += 1;
                true
            }
            PendingState::Inactive => {
                entry.state = PendingState::InProgress;
                self.next_seq += 1;
                self.in_progress += 1;
                true
            }
        }
    }

    /// Ends a render. The target becomes `Requested` if a request was merged
    /// in while it rendered, `Inactive` otherwise. Returns the new state.
    pub fn finish(&mut self, target: TargetId) -> PendingState {
        let Some(entry) = self.entries.get_mut(&target) else {
            return PendingState::Inactive;
        };
        if entry.state != PendingState::InProgress {
            return entry.state;
        }
        self.in_progress -= 1;
        if entry.rerender {
            entry.rerender = false;
            entry.state = PendingState::Requested;
            entry.seq = self.next_seq;
            self.next_seq += 1;
            self.requested += 1;
            PendingState::Requested
        } else {
            self.entries.remove(&target);
            PendingState::Inactive
        }
    }

    /// Drops an in-progress target straight to `Inactive`, discarding any
    /// merged re-render request. Returns false if it was not in progress.
    pub fn abort(&mut self, target: TargetId) -> bool {
        if self.state(target) != PendingState::InProgress {
            return false;
        }
        self.entries.remove(&target);
        self.in_progress -= 1;
        true
    }

    /// Satisfies an outstanding request without rendering it in a pass.
    /// Used when a forced update already covered the target.
    pub fn clear_request(&mut self, target: TargetId) -> bool {
        if self.state(target) != PendingState::Requested {
            return false;
        }
        self.entries.remove(&target);
        self.requested -= 1;
        true
    }

    /// Forgets a target entirely.
    pub fn remove(&mut self, target: TargetId) -> Option<PendingState> {
        let entry = self.entries.remove(&target)?;
        match entry.state {
            PendingState::Requested => self.requested -= 1,
            PendingState::InProgress => self.in_progress -= 1,
            PendingState::Inactive => {}
        }
        Some(entry.state)
    }

    /// Returns true if any target is `Requested`.
    #[inline]
    #[must_use]
    pub fn has_requested(&self) -> bool {
        self.requested > 0
    }

    /// Returns true if any target is `InProgress`.
    #[inline]
    #[must_use]
    pub fn has_in_progress(&self) -> bool {
        self.in_progress > 0
    }

    /// Number of `Requested` targets.
    #[inline]
    #[must_use]
    pub fn requested_count(&self) -> usize {
        self.requested
    }

    /// Number of `InProgress` targets.
    #[inline]
    #[must_use]
    pub fn in_progress_count(&self) -> usize {
        self.in_progress
    }

    /// Recomputes the cached counters from the entries and drops any stray
    /// inactive entries.
    pub fn recount(&mut self) {
        self.entries.retain(|_, e| e.state != PendingState::Inactive);
        self.requested = self
            .entries
            .values()
            .filter(|e| e.state == PendingState::Requested)
            .count();
        self.in_progress = self.entries.len() - self.requested;
    }

    /// Targets in `state`, ordered by `rank` and then by request sequence.
    ///
    /// `rank` returns the registration index for registered targets and
    /// `None` for the rest, which sort after all registered ones.
    pub fn targets_in<F>(&self, state: PendingState, rank: F) -> Vec<TargetId>
    where
        F: Fn(TargetId) -> Option<usize>,
    {
        let mut targets: Vec<(Option<usize>, u64, TargetId)> = self
            .entries
            .iter()
            .filter(|(_, e)| e.state == state)
            .map(|(t, e)| (rank(*t), e.seq, *t))
            .collect();
        targets.sort_by(|a, b| match (a.0, b.0) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.1.cmp(&b.1),
        });
        targets.into_iter().map(|(_, _, t)| t).collect()
    }
}
