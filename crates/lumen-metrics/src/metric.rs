use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::instrument::InstrumentDescriptor;
use crate::labels::LabelSet;
use crate::point::Point;

/// A checkpointed point tagged with the label set it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabeledPoint {
    pub labels: LabelSet,
    pub point: Point,
}

/// Everything one instrument produced in one collection cycle.
///
/// Ownership passes to the [`MetricProcessor`](crate::MetricProcessor); nothing
/// in it aliases the live store.
#[derive(Debug, Clone, Serialize)]
pub struct Metric {
    pub meter: String,
    pub descriptor: InstrumentDescriptor,
    pub points: Vec<LabeledPoint>,
    pub collected_at: DateTime<Utc>,
}

impl Metric {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn point(&self, labels: &LabelSet) -> Option<&Point> {
        self.points
            .iter()
            .find(|p| &p.labels == labels)
            .map(|p| &p.point)
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::InstrumentKind;
    use crate::number::{Number, NumberKind};
    use crate::point::PointData;

    fn sample_metric() -> Metric {
        let now = Utc::now();
        Metric {
            meter: "http".into(),
            descriptor: InstrumentDescriptor {
                name: "requests".into(),
                description: "served requests".into(),
                unit: "1".into(),
                kind: InstrumentKind::Counter,
                number_kind: NumberKind::I64,
            },
            points: vec![LabeledPoint {
                labels: LabelSet::new([("code", "200")]),
                point: Point {
                    start_time: now,
                    end_time: now,
                    data: PointData::Sum {
                        value: Number::I64(12),
                        monotonic: true,
                    },
                },
            }],
            collected_at: now,
        }
    }

    #[test]
    fn test_point_lookup() {
        let metric = sample_metric();
        assert_eq!(metric.name(), "requests");
        let point = metric.point(&LabelSet::new([("code", "200")])).unwrap();
        assert_eq!(point.data.value(), Some(Number::I64(12)));
        assert!(metric.point(&LabelSet::empty()).is_none());
        assert!(!metric.is_empty());
    }

    #[test]
    fn test_json_shape() {
        let v = serde_json::to_value(sample_metric()).unwrap();
        assert_eq!(v["meter"], "http");
        assert_eq!(v["descriptor"]["name"], "requests");
        assert_eq!(v["descriptor"]["kind"], "counter");
        assert_eq!(v["points"][0]["labels"]["code"], "200");
        assert_eq!(v["points"][0]["point"]["data"]["type"], "sum");
        assert_eq!(v["points"][0]["point"]["data"]["value"], 12);
    }
}
