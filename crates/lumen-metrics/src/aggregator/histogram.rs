use parking_lot::Mutex;
use std::sync::Arc;

use super::summary::RunningStats;
use crate::aggregator::CheckpointCell;
use crate::number::{Number, NumberKind};
use crate::point::{HistogramPoint, Point, PointData};

struct State {
    bucket_counts: Vec<u64>,
    stats: RunningStats,
}

impl State {
    fn new(kind: NumberKind, buckets: usize) -> Self {
        Self {
            bucket_counts: vec![0; buckets],
            stats: RunningStats::new(kind),
        }
    }
}

/// Fixed-boundary histogram.
///
/// `boundaries` must be finite and strictly ascending; the instrument layer
/// normalizes them (see [`normalize_boundaries`]).
pub struct HistogramAggregator {
    kind: NumberKind,
    boundaries: Arc<[f64]>,
    state: Mutex<State>,
    pub(super) cell: CheckpointCell,
}

impl HistogramAggregator {
    pub fn new(kind: NumberKind, boundaries: Arc<[f64]>) -> Self {
        let buckets = boundaries.len() + 1;
        Self {
            kind,
            boundaries,
            state: Mutex::new(State::new(kind, buckets)),
            cell: CheckpointCell::new(),
        }
    }

    /// Index of the first boundary `>= value`, or the overflow bucket.
    fn bucket_index(&self, value: f64) -> usize {
        self.boundaries
            .iter()
            .position(|&b| value <= b)
            .unwrap_or(self.boundaries.len())
    }

    pub fn update(&self, value: Number) {
        let value = value.to_kind(self.kind);
        let idx = self.bucket_index(value.as_f64());
        let mut state = self.state.lock();
        state.bucket_counts[idx] += 1;
        state.stats.record(value);
    }

    pub fn checkpoint(&self) -> Point {
        self.cell.checkpoint(|| {
            let fresh = State::new(self.kind, self.boundaries.len() + 1);
            let taken = std::mem::replace(&mut *self.state.lock(), fresh);
            PointData::Histogram(HistogramPoint {
                boundaries: self.boundaries.to_vec(),
                bucket_counts: taken.bucket_counts,
                sum: taken.stats.sum,
                count: taken.stats.count,
                min: taken.stats.min,
                max: taken.stats.max,
            })
        })
    }

    pub fn boundaries(&self) -> &[f64] {
        &self.boundaries
    }
}

/// Drop non-finite entries, sort ascending and remove duplicates.
///
/// Returns the cleaned list and whether anything had to change.
pub fn normalize_boundaries(boundaries: &[f64]) -> (Vec<f64>, bool) {
    let mut cleaned: Vec<f64> = boundaries.iter().copied().filter(|b| b.is_finite()).collect();
    cleaned.sort_by(|a, b| a.total_cmp(b));
    cleaned.dedup();
    let changed = cleaned.as_slice() != boundaries;
    (cleaned, changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn histogram(boundaries: &[f64]) -> HistogramAggregator {
        HistogramAggregator::new(NumberKind::I64, Arc::from(boundaries.to_vec()))
    }

    #[test]
    fn test_bucketing() {
        let agg = histogram(&[10.0, 20.0]);
        for v in [5, 10, 15, 25] {
            agg.update(Number::I64(v));
        }
        let PointData::Histogram(h) = agg.checkpoint().data else {
            panic!("expected histogram point");
        };
        assert_eq!(h.bucket_counts, vec![2, 1, 1]);
        assert_eq!(h.sum, Number::I64(55));
        assert_eq!(h.count, 4);
        assert_eq!(h.min, Some(Number::I64(5)));
        assert_eq!(h.max, Some(Number::I64(25)));
        assert_eq!(h.boundaries, vec![10.0, 20.0]);
    }

    #[test]
    fn test_no_boundaries_single_bucket() {
        let agg = histogram(&[]);
        agg.update(Number::I64(-100));
        agg.update(Number::I64(100));
        let PointData::Histogram(h) = agg.checkpoint().data else {
            panic!("expected histogram point");
        };
        assert_eq!(h.bucket_counts, vec![2]);
    }

    #[test]
    fn test_checkpoint_resets_buckets() {
        let agg = histogram(&[1.0]);
        agg.update(Number::I64(0));
        agg.checkpoint();
        let PointData::Histogram(h) = agg.checkpoint().data else {
            panic!("expected histogram point");
        };
        assert_eq!(h.bucket_counts, vec![0, 0]);
        assert_eq!(h.count, 0);
        assert_eq!(h.min, None);
    }

    #[test]
    fn test_concurrent_counts_stay_consistent() {
        let agg = histogram(&[100.0, 1000.0]);
        std::thread::scope(|s| {
            for t in 0..4i64 {
                let agg = &agg;
                s.spawn(move || {
                    for i in 0..500i64 {
                        agg.update(Number::I64(t * 500 + i));
                    }
                });
            }
        });
        let PointData::Histogram(h) = agg.checkpoint().data else {
            panic!("expected histogram point");
        };
        assert_eq!(h.count, 2000);
        assert_eq!(h.bucket_counts.iter().sum::<u64>(), 2000);
        assert_eq!(h.bucket_counts, vec![101, 900, 999]);
        assert_eq!(h.sum, Number::I64((0..2000).sum()));
    }

    #[test]
    fn test_normalize_boundaries() {
        let (cleaned, changed) = normalize_boundaries(&[5.0, f64::NAN, 1.0, 5.0, f64::INFINITY]);
        assert_eq!(cleaned, vec![1.0, 5.0]);
        assert!(changed);

        let (cleaned, changed) = normalize_boundaries(&[1.0, 2.0]);
        assert_eq!(cleaned, vec![1.0, 2.0]);
        assert!(!changed);
    }
}
