use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::number::Number;

/// One checkpointed snapshot of an aggregator, covering `[start_time, end_time)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub data: PointData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PointData {
    Sum {
        value: Number,
        monotonic: bool,
    },
    /// `value` is `None` when nothing was observed during the period.
    LastValue {
        value: Option<Number>,
        observed_at: Option<DateTime<Utc>>,
    },
    Max {
        value: Option<Number>,
    },
    Summary(Summary),
    Histogram(HistogramPoint),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub count: u64,
    pub sum: Number,
    pub min: Option<Number>,
    pub max: Option<Number>,
}

/// Fixed-boundary histogram snapshot.
///
/// `bucket_counts[i]` counts values `v <= boundaries[i]` not already counted by
/// a lower bucket; the final bucket counts values above every boundary, so
/// `bucket_counts.len() == boundaries.len() + 1`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramPoint {
    pub boundaries: Vec<f64>,
    pub bucket_counts: Vec<u64>,
    pub sum: Number,
    pub count: u64,
    pub min: Option<Number>,
    pub max: Option<Number>,
}

impl PointData {
    /// Number of measurements folded into the point, where the aggregation
    /// tracks it.
    pub fn count(&self) -> Option<u64> {
        match self {
            PointData::Summary(s) => Some(s.count),
            PointData::Histogram(h) => Some(h.count),
            _ => None,
        }
    }

    /// The headline value: the sum, last value or maximum. Distributions
    /// report their sum.
    pub fn value(&self) -> Option<Number> {
        match self {
            PointData::Sum { value, .. } => Some(*value),
            PointData::LastValue { value, .. } | PointData::Max { value } => *value,
            PointData::Summary(s) => Some(s.sum),
            PointData::Histogram(h) => Some(h.sum),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_and_count() {
        let sum = PointData::Sum {
            value: Number::I64(4),
            monotonic: true,
        };
        assert_eq!(sum.value(), Some(Number::I64(4)));
        assert_eq!(sum.count(), None);

        let empty_max = PointData::Max { value: None };
        assert_eq!(empty_max.value(), None);

        let summary = PointData::Summary(Summary {
            count: 3,
            sum: Number::F64(1.5),
            min: Some(Number::F64(0.0)),
            max: Some(Number::F64(1.0)),
        });
        assert_eq!(summary.count(), Some(3));
        assert_eq!(summary.value(), Some(Number::F64(1.5)));
    }

    #[test]
    fn test_serialize_tagged() {
        let data = PointData::Sum {
            value: Number::I64(2),
            monotonic: false,
        };
        let v = serde_json::to_value(&data).unwrap();
        assert_eq!(v["type"], "sum");
        assert_eq!(v["value"], 2);
        assert_eq!(v["monotonic"], false);
    }
}
