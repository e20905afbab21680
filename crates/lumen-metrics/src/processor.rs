use parking_lot::Mutex;

use crate::error::MetricsResult;
use crate::metric::Metric;
use crate::point::PointData;

/// Receives every metric a collection produces, one call per instrument.
///
/// Called synchronously from the collecting thread after the sweep, with no
/// SDK lock held. A slow processor still delays the caller of `collect`, so
/// implementations that do real I/O should hand the metric off (see the
/// batching processor in `lumen-export`) instead of blocking here.
pub trait MetricProcessor: Send + Sync {
    fn process(&self, metric: Metric) -> MetricsResult<()>;

    /// Flush and release resources. Called once, after the final collection.
    fn shutdown(&self) -> MetricsResult<()> {
        Ok(())
    }
}

/// Writes every point as a structured log event.
pub struct LogProcessor;

impl MetricProcessor for LogProcessor {
    fn process(&self, metric: Metric) -> MetricsResult<()> {
        for labeled in &metric.points {
            let data = &labeled.point.data;
            tracing::info!(
                meter = %metric.meter,
                name = %metric.descriptor.name,
                labels = %labeled.labels,
                kind = point_type(data),
                value = ?data.value(),
                count = ?data.count(),
                "metric"
            );
        }
        Ok(())
    }
}

fn point_type(data: &PointData) -> &'static str {
    match data {
        PointData::Sum { .. } => "sum",
        PointData::LastValue { .. } => "last_value",
        PointData::Max { .. } => "max",
        PointData::Summary(_) => "summary",
        PointData::Histogram(_) => "histogram",
    }
}

/// Keeps every processed metric in memory until taken.
#[derive(Default)]
pub struct InMemoryProcessor {
    metrics: Mutex<Vec<Metric>>,
}

impl InMemoryProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_metrics(&self) -> Vec<Metric> {
        std::mem::take(&mut *self.metrics.lock())
    }

    pub fn len(&self) -> usize {
        self.metrics.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.lock().is_empty()
    }
}

impl MetricProcessor for InMemoryProcessor {
    fn process(&self, metric: Metric) -> MetricsResult<()> {
        self.metrics.lock().push(metric);
        Ok(())
    }
}

pub struct NoopProcessor;

impl MetricProcessor for NoopProcessor {
    fn process(&self, _metric: Metric) -> MetricsResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::{InstrumentDescriptor, InstrumentKind};
    use crate::number::NumberKind;
    use chrono::Utc;

    fn empty_metric(name: &str) -> Metric {
        Metric {
            meter: "test".into(),
            descriptor: InstrumentDescriptor::new(name, InstrumentKind::Gauge, NumberKind::F64),
            points: Vec::new(),
            collected_at: Utc::now(),
        }
    }

    #[test]
    fn test_in_memory_take() {
        let processor = InMemoryProcessor::new();
        processor.process(empty_metric("a")).unwrap();
        processor.process(empty_metric("b")).unwrap();
        assert_eq!(processor.len(), 2);

        let names: Vec<String> = processor
            .take_metrics()
            .into_iter()
            .map(|m| m.descriptor.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(processor.is_empty());
    }

    #[test]
    fn test_log_and_noop_accept() {
        assert!(LogProcessor.process(empty_metric("a")).is_ok());
        assert!(NoopProcessor.process(empty_metric("a")).is_ok());
        assert!(NoopProcessor.shutdown().is_ok());
    }
}
