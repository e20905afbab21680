//! Export pipeline for `lumen-metrics`.
//!
//! A [`BatchProcessor`] takes metrics off the collecting thread through a
//! bounded queue and feeds them to an [`Exporter`] from a pool of tokio
//! workers. A [`PeriodicReader`] drives collection on a timer and performs the
//! final collection on shutdown.

pub mod config;
pub mod error;
pub mod exporter;
pub mod processor;
pub mod reader;

pub use config::{ExportConfig, ExporterType};
pub use error::ExportError;
pub use exporter::{Exporter, FileExporter, InMemoryExporter, LogExporter};
pub use processor::{BatchProcessor, ExportStats};
pub use reader::PeriodicReader;

use std::sync::Arc;

/// Build the exporter selected by `config`.
pub fn build_exporter(config: &ExportConfig) -> Arc<dyn Exporter> {
    match config.exporter_type {
        ExporterType::Log => Arc::new(LogExporter),
        ExporterType::File => Arc::new(FileExporter::new(&config.export_path)),
        ExporterType::Memory => Arc::new(InMemoryExporter::new()),
    }
}
