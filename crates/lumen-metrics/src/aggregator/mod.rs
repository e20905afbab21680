//! Per-(instrument, label set) accumulators.
//!
//! Every variant supports the same three operations:
//!
//! - `update`: fold one measurement into the current period. Safe under any
//!   number of concurrent callers.
//! - `checkpoint`: snapshot the current period into a [`Point`] and reset to
//!   the zero state. The snapshot and the reset happen inside one critical
//!   section (an atomic swap or the aggregator's own lock), so a concurrent
//!   `update` lands either in the returned point or in the next period.
//! - `to_point`: return the last checkpoint without touching live state.
//!
//! Checkpoints are serialized per aggregator through [`CheckpointCell`], which
//! also tracks the start of the running period.

mod histogram;
mod last_value;
mod max;
mod sum;
mod summary;

pub use histogram::{normalize_boundaries, HistogramAggregator};
pub use last_value::LastValueAggregator;
pub use max::MaxAggregator;
pub use sum::SumAggregator;
pub use summary::SummaryAggregator;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::number::{Number, NumberKind};
use crate::point::{Point, PointData};

/// Which aggregation an instrument uses. Fixed at instrument creation.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregatorKind {
    Sum { monotonic: bool },
    LastValue,
    Max,
    Summary,
    Histogram { boundaries: Arc<[f64]> },
}

pub enum Aggregator {
    Sum(SumAggregator),
    LastValue(LastValueAggregator),
    Max(MaxAggregator),
    Summary(SummaryAggregator),
    Histogram(HistogramAggregator),
}

impl Aggregator {
    pub fn new(kind: &AggregatorKind, number_kind: NumberKind) -> Self {
        match kind {
            AggregatorKind::Sum { monotonic } => {
                Aggregator::Sum(SumAggregator::new(number_kind, *monotonic))
            }
            AggregatorKind::LastValue => Aggregator::LastValue(LastValueAggregator::new()),
            AggregatorKind::Max => Aggregator::Max(MaxAggregator::new(number_kind)),
            AggregatorKind::Summary => Aggregator::Summary(SummaryAggregator::new(number_kind)),
            AggregatorKind::Histogram { boundaries } => {
                Aggregator::Histogram(HistogramAggregator::new(number_kind, boundaries.clone()))
            }
        }
    }

    pub fn update(&self, value: Number) {
        match self {
            Aggregator::Sum(a) => a.update(value),
            Aggregator::LastValue(a) => a.update(value),
            Aggregator::Max(a) => a.update(value),
            Aggregator::Summary(a) => a.update(value),
            Aggregator::Histogram(a) => a.update(value),
        }
    }

    pub fn checkpoint(&self) -> Point {
        match self {
            Aggregator::Sum(a) => a.checkpoint(),
            Aggregator::LastValue(a) => a.checkpoint(),
            Aggregator::Max(a) => a.checkpoint(),
            Aggregator::Summary(a) => a.checkpoint(),
            Aggregator::Histogram(a) => a.checkpoint(),
        }
    }

    pub fn to_point(&self) -> Option<Point> {
        self.cell().last()
    }

    fn cell(&self) -> &CheckpointCell {
        match self {
            Aggregator::Sum(a) => &a.cell,
            Aggregator::LastValue(a) => &a.cell,
            Aggregator::Max(a) => &a.cell,
            Aggregator::Summary(a) => &a.cell,
            Aggregator::Histogram(a) => &a.cell,
        }
    }
}

struct CellState {
    period_start: DateTime<Utc>,
    last: Option<Point>,
}

/// Period bookkeeping shared by every aggregator variant.
pub(crate) struct CheckpointCell {
    state: Mutex<CellState>,
}

impl CheckpointCell {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CellState {
                period_start: Utc::now(),
                last: None,
            }),
        }
    }

    /// Run `take` (which must snapshot and reset the live state) while holding
    /// the checkpoint lock, and stamp the result with the period bounds.
    pub fn checkpoint(&self, take: impl FnOnce() -> PointData) -> Point {
        let mut state = self.state.lock();
        let data = take();
        let end_time = Utc::now();
        let point = Point {
            start_time: state.period_start,
            end_time,
            data,
        };
        state.period_start = end_time;
        state.last = Some(point.clone());
        point
    }

    pub fn last(&self) -> Option<Point> {
        self.state.lock().last.clone()
    }
}
