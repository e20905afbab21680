use crate::aggregator::CheckpointCell;
use crate::number::{AtomicNumber, Number, NumberKind};
use crate::point::{Point, PointData};

/// Running maximum, kept with a compare-and-exchange loop.
///
/// The empty state is the kind's floor (`i64::MIN`, `-inf`). Non-finite floats
/// never reach the aggregator, so `-inf` always reads as "nothing observed";
/// an `i64::MIN` measurement is indistinguishable from an empty period.
pub struct MaxAggregator {
    value: AtomicNumber,
    pub(super) cell: CheckpointCell,
}

fn floor(kind: NumberKind) -> Number {
    match kind {
        NumberKind::I64 => Number::I64(i64::MIN),
        NumberKind::F64 => Number::F64(f64::NEG_INFINITY),
    }
}

impl MaxAggregator {
    pub fn new(kind: NumberKind) -> Self {
        Self {
            value: AtomicNumber::new(floor(kind)),
            cell: CheckpointCell::new(),
        }
    }

    pub fn update(&self, value: Number) {
        self.value.fetch_max(value);
    }

    pub fn checkpoint(&self) -> Point {
        self.cell.checkpoint(|| {
            let empty = floor(self.value.kind());
            let value = self.value.swap(empty);
            PointData::Max {
                value: (value != empty).then_some(value),
            }
        })
    }
}
