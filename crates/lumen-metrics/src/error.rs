//! Error types for the metrics SDK.
//!
//! None of these are returned from the recording path; they exist so that
//! discarded measurements and failed exports can be logged with a precise
//! cause, and so processors can report failure to the collection sweep.

use crate::instrument::InstrumentKind;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetricsError {
    /// A measurement that the instrument cannot accept, e.g. a negative delta
    /// on a monotonic counter or a non-finite float.
    #[error("invalid measurement for `{instrument}`: {reason}")]
    InvalidMeasurement { instrument: String, reason: String },

    /// A label entry rejected at label set construction.
    #[error("invalid label `{key}`: {reason}")]
    InvalidLabel { key: String, reason: String },

    /// An instrument name re-registered with a different kind.
    #[error("instrument `{name}` already registered as {existing:?}, requested {requested:?}")]
    InstrumentConflict {
        name: String,
        existing: InstrumentKind,
        requested: InstrumentKind,
    },

    /// A processor or exporter could not accept a metric.
    #[error("export failed: {0}")]
    Export(String),

    /// The provider has been shut down.
    #[error("meter provider is shut down")]
    ShutDown,
}

/// Convenience result type.
pub type MetricsResult<T> = std::result::Result<T, MetricsError>;
