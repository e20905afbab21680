//! Exporter backends.
//!
//! - `LogExporter`: logs every point via `tracing`.
//! - `FileExporter`: appends metrics to a JSON-lines file.
//! - `InMemoryExporter`: keeps metrics in memory for tests and inspection.

use async_trait::async_trait;
use lumen_metrics::Metric;
use parking_lot::Mutex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::ExportError;

/// Ships a batch of collected metrics to a backend.
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn export(&self, metrics: &[Metric]) -> Result<(), ExportError>;
}

pub struct LogExporter;

#[async_trait]
impl Exporter for LogExporter {
    async fn export(&self, metrics: &[Metric]) -> Result<(), ExportError> {
        for metric in metrics {
            for labeled in &metric.points {
                tracing::info!(
                    meter = %metric.meter,
                    name = %metric.descriptor.name,
                    unit = %metric.descriptor.unit,
                    labels = %labeled.labels,
                    value = ?labeled.point.data.value(),
                    count = ?labeled.point.data.count(),
                    end_time = %labeled.point.end_time,
                    "metric point"
                );
            }
        }
        Ok(())
    }
}

/// Appends one JSON object per metric to the configured file.
pub struct FileExporter {
    path: PathBuf,
}

impl FileExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Exporter for FileExporter {
    async fn export(&self, metrics: &[Metric]) -> Result<(), ExportError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        for metric in metrics {
            let json = serde_json::to_string(metric)?;
            writeln!(file, "{}", json)?;
        }

        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryExporter {
    metrics: Mutex<Vec<Metric>>,
}

impl InMemoryExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take all stored metrics, leaving the buffer empty.
    pub fn take_metrics(&self) -> Vec<Metric> {
        std::mem::take(&mut *self.metrics.lock())
    }

    pub fn count(&self) -> usize {
        self.metrics.lock().len()
    }
}

#[async_trait]
impl Exporter for InMemoryExporter {
    async fn export(&self, metrics: &[Metric]) -> Result<(), ExportError> {
        self.metrics.lock().extend(metrics.iter().cloned());
        Ok(())
    }
}
