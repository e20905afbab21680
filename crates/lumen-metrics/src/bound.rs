//! One accumulator per (instrument, label set), plus its lifecycle status.
//!
//! ```text
//!   explicit bind ──► Bound (never leaves, never evicted)
//!
//!   record ──► UpdatePending ──collect──► NoPendingUpdate ──collect──► CandidateForRemoval
//!                 ▲                             │                            │
//!                 └───────────── bind ──────────┴──────────── bind ──────────┤
//!                                                                     collect│
//!                                                                            ▼
//!                                                                  queued, then evicted
//! ```
//!
//! The status has its own lock, separate from the store's structural lock and
//! from the aggregator's synchronization.
//!
//! Ephemeral writers pin the instrument between the bind and the update, and
//! mark it dirty once the update lands. Eviction requires no pinned writer and
//! no write since the last checkpoint, so a measurement can never end up in an
//! accumulator that has already been exported for the last time.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::aggregator::Aggregator;
use crate::labels::LabelSet;
use crate::number::Number;
use crate::point::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Explicitly bound by the application. Terminal.
    Bound,
    /// Written (or re-bound) since the last collection.
    UpdatePending,
    /// No bind since the last collection.
    NoPendingUpdate,
    /// No bind for two collections; evicted at the next one.
    CandidateForRemoval,
}

/// What [`BoundInstrument::reactivate`] found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reactivation {
    /// Still registered in its store.
    Live,
    /// Evicted by a collection sweep before the bind got here and not yet
    /// re-registered; the caller must put it back.
    Evicted,
}

/// What the collection sweep should do after advancing an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SweepAction {
    Keep,
    Evict,
}

struct StatusCell {
    status: RecordStatus,
    evicted: bool,
}

pub struct BoundInstrument {
    labels: LabelSet,
    aggregator: Aggregator,
    status: Mutex<StatusCell>,
    writers: AtomicUsize,
    dirty: AtomicBool,
}

impl BoundInstrument {
    /// A new instrument. With `pin` set it starts with one writer pinned, to be
    /// released by [`finish_write`](Self::finish_write).
    pub(crate) fn new(labels: LabelSet, aggregator: Aggregator, persistent: bool, pin: bool) -> Self {
        let status = if persistent {
            RecordStatus::Bound
        } else {
            RecordStatus::UpdatePending
        };
        Self {
            labels,
            aggregator,
            status: Mutex::new(StatusCell {
                status,
                evicted: false,
            }),
            writers: AtomicUsize::new(usize::from(pin)),
            dirty: AtomicBool::new(false),
        }
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn status(&self) -> RecordStatus {
        self.status.lock().status
    }

    pub fn update(&self, value: Number) {
        self.aggregator.update(value);
    }

    /// Bind-side transition, applied on every lookup of an existing instrument.
    ///
    /// `NoPendingUpdate` and `CandidateForRemoval` go back to `UpdatePending`.
    /// A persistent bind promotes the instrument to `Bound` so a handle the
    /// application keeps can never point at an evicted accumulator.
    ///
    /// With `pin` set, a writer is registered under the same lock; release it
    /// with [`finish_write`](Self::finish_write) or [`unpin`](Self::unpin).
    pub(crate) fn reactivate(&self, persistent: bool, pin: bool) -> Reactivation {
        let mut cell = self.status.lock();
        if pin {
            self.writers.fetch_add(1, Ordering::SeqCst);
        }
        match cell.status {
            RecordStatus::Bound => {}
            // Explicit binds promote so a held handle is never evicted.
            _ if persistent => cell.status = RecordStatus::Bound,
            RecordStatus::UpdatePending => {}
            RecordStatus::NoPendingUpdate | RecordStatus::CandidateForRemoval => {
                cell.status = RecordStatus::UpdatePending;
            }
        }
        if cell.evicted {
            Reactivation::Evicted
        } else {
            Reactivation::Live
        }
    }

    /// Called once the instrument is registered in its store again.
    pub(crate) fn clear_evicted(&self) {
        self.status.lock().evicted = false;
    }

    /// Release a pinned writer after its update landed.
    pub(crate) fn finish_write(&self) {
        self.dirty.store(true, Ordering::SeqCst);
        self.writers.fetch_sub(1, Ordering::SeqCst);
    }

    /// Release a pinned writer that did not write.
    pub(crate) fn unpin(&self) {
        self.writers.fetch_sub(1, Ordering::SeqCst);
    }

    /// Collect-side transition, applied right after the checkpoint.
    pub(crate) fn advance(&self) -> SweepAction {
        let mut cell = self.status.lock();
        match cell.status {
            RecordStatus::Bound => SweepAction::Keep,
            RecordStatus::UpdatePending => {
                cell.status = RecordStatus::NoPendingUpdate;
                SweepAction::Keep
            }
            RecordStatus::NoPendingUpdate => {
                cell.status = RecordStatus::CandidateForRemoval;
                SweepAction::Keep
            }
            RecordStatus::CandidateForRemoval => SweepAction::Evict,
        }
    }

    /// Eviction check, run with the store's structural lock held. Marks the
    /// instrument evicted and returns `true` only if it is still a candidate,
    /// no writer is pinned, and nothing was written since the last checkpoint.
    pub(crate) fn try_mark_evicted(&self) -> bool {
        let mut cell = self.status.lock();
        if cell.status == RecordStatus::CandidateForRemoval
            && self.writers.load(Ordering::SeqCst) == 0
            && !self.dirty.load(Ordering::SeqCst)
        {
            cell.evicted = true;
            true
        } else {
            false
        }
    }

    pub(crate) fn checkpoint(&self) -> Point {
        self.dirty.store(false, Ordering::SeqCst);
        self.aggregator.checkpoint()
    }
}

impl std::fmt::Debug for BoundInstrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundInstrument")
            .field("labels", &self.labels)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AggregatorKind;
    use crate::number::NumberKind;

    fn instrument(persistent: bool) -> BoundInstrument {
        BoundInstrument::new(
            LabelSet::new([("k", "v")]),
            Aggregator::new(&AggregatorKind::Sum { monotonic: true }, NumberKind::I64),
            persistent,
            false,
        )
    }

    #[test]
    fn test_initial_status() {
        assert_eq!(instrument(true).status(), RecordStatus::Bound);
        assert_eq!(instrument(false).status(), RecordStatus::UpdatePending);
    }

    #[test]
    fn test_collect_side_progression() {
        let inst = instrument(false);
        assert_eq!(inst.advance(), SweepAction::Keep);
        assert_eq!(inst.status(), RecordStatus::NoPendingUpdate);
        assert_eq!(inst.advance(), SweepAction::Keep);
        assert_eq!(inst.status(), RecordStatus::CandidateForRemoval);
        assert_eq!(inst.advance(), SweepAction::Evict);
        assert_eq!(inst.status(), RecordStatus::CandidateForRemoval);
    }

    #[test]
    fn test_bound_never_moves() {
        let inst = instrument(true);
        for _ in 0..10 {
            assert_eq!(inst.advance(), SweepAction::Keep);
        }
        assert_eq!(inst.reactivate(false, false), Reactivation::Live);
        assert_eq!(inst.status(), RecordStatus::Bound);
        assert!(!inst.try_mark_evicted());
    }

    #[test]
    fn test_reactivation() {
        let inst = instrument(false);
        inst.advance();
        assert_eq!(inst.reactivate(false, false), Reactivation::Live);
        assert_eq!(inst.status(), RecordStatus::UpdatePending);

        inst.advance();
        inst.advance();
        assert_eq!(inst.status(), RecordStatus::CandidateForRemoval);
        inst.reactivate(false, false);
        assert_eq!(inst.status(), RecordStatus::UpdatePending);
        assert!(!inst.try_mark_evicted());
    }

    #[test]
    fn test_reactivate_after_eviction() {
        let inst = instrument(false);
        inst.advance();
        inst.advance();
        assert!(inst.try_mark_evicted());
        assert_eq!(inst.reactivate(false, false), Reactivation::Evicted);
        assert_eq!(inst.status(), RecordStatus::UpdatePending);
        // Stays evicted until the store takes it back.
        assert_eq!(inst.reactivate(false, false), Reactivation::Evicted);
        inst.clear_evicted();
        assert_eq!(inst.reactivate(false, false), Reactivation::Live);
    }

    #[test]
    fn test_persistent_bind_promotes() {
        let inst = instrument(false);
        inst.advance();
        inst.reactivate(true, false);
        assert_eq!(inst.status(), RecordStatus::Bound);
    }

    #[test]
    fn test_pinned_writer_blocks_eviction() {
        let inst = instrument(false);
        inst.advance();
        inst.advance();
        inst.reactivate(false, true);
        inst.advance();
        inst.advance();
        assert_eq!(inst.status(), RecordStatus::CandidateForRemoval);
        assert!(!inst.try_mark_evicted());

        inst.update(Number::I64(1));
        inst.finish_write();
        // Written after the last checkpoint: must be exported first.
        assert!(!inst.try_mark_evicted());
        inst.checkpoint();
        assert!(inst.try_mark_evicted());
    }
}
