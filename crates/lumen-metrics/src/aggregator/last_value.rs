use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::aggregator::CheckpointCell;
use crate::number::Number;
use crate::point::{Point, PointData};

/// Most recent observation wins. Each write is stamped with its wall-clock
/// time and a write never replaces one stamped later.
pub struct LastValueAggregator {
    current: Mutex<Option<(Number, DateTime<Utc>)>>,
    pub(super) cell: CheckpointCell,
}

impl LastValueAggregator {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
            cell: CheckpointCell::new(),
        }
    }

    pub fn update(&self, value: Number) {
        self.update_at(value, Utc::now());
    }

    fn update_at(&self, value: Number, observed_at: DateTime<Utc>) {
        let mut current = self.current.lock();
        match *current {
            Some((_, latest)) if latest > observed_at => {}
            _ => *current = Some((value, observed_at)),
        }
    }

    pub fn checkpoint(&self) -> Point {
        self.cell.checkpoint(|| {
            let taken = self.current.lock().take();
            PointData::LastValue {
                value: taken.map(|(v, _)| v),
                observed_at: taken.map(|(_, at)| at),
            }
        })
    }
}

impl Default for LastValueAggregator {
    fn default() -> Self {
        Self::new()
    }
}
