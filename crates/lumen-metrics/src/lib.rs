//! In-process metrics SDK.
//!
//! Application threads record through instrument handles obtained from a
//! [`Meter`]. Each instrument keeps one accumulator per [`LabelSet`]; a
//! periodic collection checkpoints every accumulator, ages out label sets that
//! stopped receiving writes, and hands one [`Metric`] per instrument to the
//! configured [`MetricProcessor`].
//!
//! ```
//! use std::sync::Arc;
//! use lumen_metrics::{InMemoryProcessor, MeterProvider};
//!
//! let processor = Arc::new(InMemoryProcessor::new());
//! let provider = MeterProvider::builder()
//!     .with_processor(processor.clone())
//!     .build();
//! let meter = provider.meter("http");
//! let requests = meter.i64_counter("requests").with_unit("1").init();
//! requests.add(1, &meter.labels([("method", "GET")]));
//!
//! provider.collect();
//! assert_eq!(processor.take_metrics().len(), 1);
//! ```

pub mod aggregator;
pub mod bound;
pub mod config;
pub mod error;
pub mod instrument;
pub mod labels;
pub mod meter;
pub mod metric;
pub mod number;
pub mod point;
pub mod processor;
pub mod provider;
pub mod store;

pub use aggregator::{Aggregator, AggregatorKind};
pub use bound::{BoundInstrument, RecordStatus};
pub use config::SdkConfig;
pub use error::{MetricsError, MetricsResult};
pub use instrument::{
    BoundCounter, BoundRecorder, Counter, Gauge, Histogram, InstrumentBuilder,
    InstrumentDescriptor, InstrumentKind, MaxGauge, Summary, SyncInstrument, UpDownCounter,
};
pub use labels::{LabelLimits, LabelSet};
pub use meter::{CollectStats, Meter};
pub use metric::{LabeledPoint, Metric};
pub use number::{Number, NumberKind};
pub use point::{HistogramPoint, Point, PointData};
pub use processor::{InMemoryProcessor, LogProcessor, MetricProcessor, NoopProcessor};
pub use provider::{MeterProvider, MeterProviderBuilder, ProviderState};
pub use store::{Collected, InstrumentStore};
