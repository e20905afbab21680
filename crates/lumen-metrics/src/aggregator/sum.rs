use crate::aggregator::CheckpointCell;
use crate::number::{AtomicNumber, Number, NumberKind};
use crate::point::{Point, PointData};

/// Running sum. Updates are a single atomic add; checkpoint swaps in zero.
///
/// Negative deltas on monotonic sums are rejected by the instrument layer
/// before they get here.
pub struct SumAggregator {
    value: AtomicNumber,
    monotonic: bool,
    pub(super) cell: CheckpointCell,
}

impl SumAggregator {
    pub fn new(kind: NumberKind, monotonic: bool) -> Self {
        Self {
            value: AtomicNumber::new(Number::zero(kind)),
            monotonic,
            cell: CheckpointCell::new(),
        }
    }

    pub fn update(&self, value: Number) {
        self.value.fetch_add(value);
    }

    pub fn checkpoint(&self) -> Point {
        self.cell.checkpoint(|| PointData::Sum {
            value: self.value.swap(Number::zero(self.value.kind())),
            monotonic: self.monotonic,
        })
    }

    pub fn is_monotonic(&self) -> bool {
        self.monotonic
    }
}
