//! Label-keyed accumulators for one instrument.
//!
//! The map sits behind a single structural lock that is only held to look up,
//! insert or remove an entry. Status transitions use each instrument's own
//! lock; the two are only ever nested as structural → status.

use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use crate::aggregator::{Aggregator, AggregatorKind};
use crate::bound::{BoundInstrument, Reactivation, SweepAction};
use crate::labels::LabelSet;
use crate::metric::LabeledPoint;
use crate::number::{Number, NumberKind};

/// Result of one checkpoint pass over the store.
pub(crate) struct Sweep {
    pub points: Vec<LabeledPoint>,
    pub removal_queue: Vec<Arc<BoundInstrument>>,
}

/// Points produced by [`InstrumentStore::collect`].
#[derive(Debug)]
pub struct Collected {
    pub points: Vec<LabeledPoint>,
    pub evicted: usize,
}

pub struct InstrumentStore {
    aggregation: AggregatorKind,
    number_kind: NumberKind,
    entries: Mutex<HashMap<LabelSet, Arc<BoundInstrument>>>,
}

impl InstrumentStore {
    pub fn new(aggregation: AggregatorKind, number_kind: NumberKind) -> Self {
        Self {
            aggregation,
            number_kind,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn aggregation(&self) -> &AggregatorKind {
        &self.aggregation
    }

    pub fn number_kind(&self) -> NumberKind {
        self.number_kind
    }

    /// Find or create the accumulator for `labels`.
    ///
    /// `persistent` binds come from explicit application `bind` calls and
    /// produce (or promote to) `Bound` instruments that are never evicted.
    /// A non-persistent handle returned here is only safe to write through
    /// until the next collection; the write path uses [`record`](Self::record).
    pub fn bind(&self, labels: &LabelSet, persistent: bool) -> Arc<BoundInstrument> {
        self.resolve(labels, persistent, false)
    }

    /// Ephemeral write: bind `labels` and fold `value` into its accumulator.
    pub fn record(&self, labels: &LabelSet, value: Number) {
        let instrument = self.resolve(labels, false, true);
        instrument.update(value);
        instrument.finish_write();
    }

    fn resolve(&self, labels: &LabelSet, persistent: bool, pin: bool) -> Arc<BoundInstrument> {
        loop {
            let existing = {
                let mut entries = self.entries.lock();
                match entries.get(labels) {
                    Some(instrument) => instrument.clone(),
                    None => {
                        let instrument = Arc::new(BoundInstrument::new(
                            labels.clone(),
                            Aggregator::new(&self.aggregation, self.number_kind),
                            persistent,
                            pin,
                        ));
                        entries.insert(labels.clone(), instrument.clone());
                        return instrument;
                    }
                }
            };

            match existing.reactivate(persistent, pin) {
                Reactivation::Live => return existing,
                Reactivation::Evicted => {
                    if self.reinsert(&existing) {
                        return existing;
                    }
                    // A newer instrument already took the slot; bind to it.
                    if pin {
                        existing.unpin();
                    }
                }
            }
        }
    }

    /// Put an instrument evicted by a concurrent sweep back into the map.
    /// Returns `false` if a different instrument now owns its label set.
    fn reinsert(&self, instrument: &Arc<BoundInstrument>) -> bool {
        let mut entries = self.entries.lock();
        match entries.entry(instrument.labels().clone()) {
            Entry::Vacant(slot) => {
                slot.insert(instrument.clone());
                instrument.clear_evicted();
                tracing::debug!(labels = %instrument.labels(), "re-registered evicted instrument");
                true
            }
            Entry::Occupied(slot) => Arc::ptr_eq(slot.get(), instrument),
        }
    }

    /// Remove the entry for `labels` if it is still a removal candidate.
    pub fn unbind(&self, labels: &LabelSet) -> bool {
        let mut entries = self.entries.lock();
        let evict = entries
            .get(labels)
            .is_some_and(|instrument| instrument.try_mark_evicted());
        if evict {
            entries.remove(labels);
        }
        evict
    }

    fn unbind_instrument(&self, instrument: &Arc<BoundInstrument>) -> bool {
        let mut entries = self.entries.lock();
        let evict = entries
            .get(instrument.labels())
            .is_some_and(|current| Arc::ptr_eq(current, instrument))
            && instrument.try_mark_evicted();
        if evict {
            entries.remove(instrument.labels());
        }
        evict
    }

    /// Checkpoint every instrument present when the sweep starts and advance
    /// its status. Instruments inserted during the sweep wait for the next one.
    pub(crate) fn sweep(&self) -> Sweep {
        let snapshot: Vec<Arc<BoundInstrument>> = self.entries.lock().values().cloned().collect();

        let mut points = Vec::with_capacity(snapshot.len());
        let mut removal_queue = Vec::new();
        for instrument in snapshot {
            points.push(LabeledPoint {
                labels: instrument.labels().clone(),
                point: instrument.checkpoint(),
            });
            if instrument.advance() == SweepAction::Evict {
                removal_queue.push(instrument);
            }
        }
        points.sort_by(|a, b| a.labels.encoded().cmp(b.labels.encoded()));

        Sweep {
            points,
            removal_queue,
        }
    }

    /// Remove queued instruments that are still candidates. Returns how many
    /// were removed.
    pub(crate) fn evict(&self, queue: Vec<Arc<BoundInstrument>>) -> usize {
        queue
            .iter()
            .filter(|instrument| self.unbind_instrument(instrument))
            .count()
    }

    /// One full collection pass: sweep, then evict.
    pub fn collect(&self) -> Collected {
        let sweep = self.sweep();
        let evicted = self.evict(sweep.removal_queue);
        Collected {
            points: sweep.points,
            evicted,
        }
    }

    pub fn get(&self, labels: &LabelSet) -> Option<Arc<BoundInstrument>> {
        self.entries.lock().get(labels).cloned()
    }

    pub fn contains(&self, labels: &LabelSet) -> bool {
        self.entries.lock().contains_key(labels)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
