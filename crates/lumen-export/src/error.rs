use lumen_metrics::MetricsError;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("export queue full, dropped `{0}`")]
    QueueFull(String),

    #[error("export pipeline closed")]
    Closed,
}

impl From<ExportError> for MetricsError {
    fn from(e: ExportError) -> Self {
        MetricsError::Export(e.to_string())
    }
}
