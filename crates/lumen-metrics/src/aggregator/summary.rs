use parking_lot::Mutex;

use crate::aggregator::CheckpointCell;
use crate::number::{Number, NumberKind};
use crate::point::{Point, PointData, Summary};

/// Count, sum, min and max. They move together, so they share one lock.
#[derive(Debug, Clone)]
pub(super) struct RunningStats {
    pub count: u64,
    pub sum: Number,
    pub min: Option<Number>,
    pub max: Option<Number>,
}

impl RunningStats {
    pub fn new(kind: NumberKind) -> Self {
        Self {
            count: 0,
            sum: Number::zero(kind),
            min: None,
            max: None,
        }
    }

    pub fn record(&mut self, value: Number) {
        self.count += 1;
        self.sum = self.sum.add(value);
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
    }
}

pub struct SummaryAggregator {
    kind: NumberKind,
    stats: Mutex<RunningStats>,
    pub(super) cell: CheckpointCell,
}

impl SummaryAggregator {
    pub fn new(kind: NumberKind) -> Self {
        Self {
            kind,
            stats: Mutex::new(RunningStats::new(kind)),
            cell: CheckpointCell::new(),
        }
    }

    pub fn update(&self, value: Number) {
        self.stats.lock().record(value.to_kind(self.kind));
    }

    pub fn checkpoint(&self) -> Point {
        self.cell.checkpoint(|| {
            let stats = std::mem::replace(&mut *self.stats.lock(), RunningStats::new(self.kind));
            PointData::Summary(Summary {
                count: stats.count,
                sum: stats.sum,
                min: stats.min,
                max: stats.max,
            })
        })
    }
}
