//! The root of the SDK: owns configuration, the processor and every meter.
//!
//! Lifecycle is `init` (the builder) → `active` → `shut down`. Shutting down
//! runs one final collection, then turns every handle, meter and collect call
//! into a no-op.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::SdkConfig;
use crate::error::{MetricsError, MetricsResult};
use crate::meter::{CollectStats, Meter};
use crate::processor::{MetricProcessor, NoopProcessor};

/// Shared active/shut-down flag checked on every write, plus a count of
/// writes currently in flight.
pub(crate) struct Lifecycle {
    shut_down: AtomicBool,
    writers: AtomicUsize,
}

/// Keeps the provider from finishing shutdown while one write lands.
pub(crate) struct WriteGuard<'a> {
    lifecycle: &'a Lifecycle,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.lifecycle.writers.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            shut_down: AtomicBool::new(false),
            writers: AtomicUsize::new(0),
        }
    }

    pub fn is_active(&self) -> bool {
        !self.shut_down.load(Ordering::Acquire)
    }

    /// Register a write. Returns `None` once shut down.
    ///
    /// The counter is raised before the flag is read, and `shut_down` sets the
    /// flag before `wait_for_writers` reads the counter. Both are `SeqCst`, so
    /// either the writer sees the flag or shutdown sees the writer.
    pub fn enter(&self) -> Option<WriteGuard<'_>> {
        self.writers.fetch_add(1, Ordering::SeqCst);
        let guard = WriteGuard { lifecycle: self };
        if self.shut_down.load(Ordering::SeqCst) {
            return None;
        }
        Some(guard)
    }

    /// Returns `false` if already shut down.
    pub fn shut_down(&self) -> bool {
        !self.shut_down.swap(true, Ordering::SeqCst)
    }

    /// Spin until every write admitted before `shut_down` has finished.
    pub fn wait_for_writers(&self) {
        while self.writers.load(Ordering::SeqCst) != 0 {
            std::thread::yield_now();
        }
    }
}

pub(crate) struct ProviderShared {
    pub lifecycle: Arc<Lifecycle>,
    pub config: SdkConfig,
    pub processor: Arc<dyn MetricProcessor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    Active,
    ShutDown,
}

pub struct MeterProviderBuilder {
    config: SdkConfig,
    processor: Option<Arc<dyn MetricProcessor>>,
}

impl MeterProviderBuilder {
    pub fn with_config(mut self, config: SdkConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_processor(mut self, processor: Arc<dyn MetricProcessor>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn build(self) -> MeterProvider {
        let processor = self.processor.unwrap_or_else(|| {
            tracing::warn!("no metric processor configured, collected metrics are discarded");
            Arc::new(NoopProcessor)
        });
        tracing::info!(
            default_boundaries = self.config.default_histogram_boundaries.len(),
            max_labels = self.config.labels.max_labels,
            "meter provider started"
        );
        MeterProvider {
            shared: Arc::new(ProviderShared {
                lifecycle: Arc::new(Lifecycle::new()),
                config: self.config,
                processor,
            }),
            meters: Mutex::new(Vec::new()),
        }
    }
}

pub struct MeterProvider {
    shared: Arc<ProviderShared>,
    meters: Mutex<Vec<Arc<Meter>>>,
}

impl MeterProvider {
    pub fn builder() -> MeterProviderBuilder {
        MeterProviderBuilder {
            config: SdkConfig::default(),
            processor: None,
        }
    }

    pub fn state(&self) -> ProviderState {
        if self.shared.lifecycle.is_active() {
            ProviderState::Active
        } else {
            ProviderState::ShutDown
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.state() == ProviderState::ShutDown
    }

    pub fn config(&self) -> &SdkConfig {
        &self.shared.config
    }

    /// Get or create the meter called `name`.
    ///
    /// After shutdown this returns a detached meter whose instruments are all
    /// no-ops.
    pub fn meter(&self, name: impl Into<String>) -> Arc<Meter> {
        let name = name.into();
        let mut meters = self.meters.lock();
        if !self.shared.lifecycle.is_active() {
            return Arc::new(Meter::new(name, self.shared.clone()));
        }
        if let Some(meter) = meters.iter().find(|m| m.name() == name) {
            return meter.clone();
        }
        let meter = Arc::new(Meter::new(name, self.shared.clone()));
        meters.push(meter.clone());
        meter
    }

    /// Collect every meter, in creation order.
    pub fn collect(&self) -> CollectStats {
        let mut stats = CollectStats::default();
        for meter in self.meters_snapshot() {
            stats.merge(meter.collect());
        }
        stats
    }

    /// Stop accepting measurements and run the final collection.
    ///
    /// Writes that were already admitted when the flag flipped are waited
    /// for, so they land in the final collection. Returns that collection's
    /// stats, or [`MetricsError::ShutDown`] if the provider was already shut
    /// down.
    pub fn shutdown(&self) -> MetricsResult<CollectStats> {
        if !self.shared.lifecycle.shut_down() {
            return Err(MetricsError::ShutDown);
        }
        self.shared.lifecycle.wait_for_writers();

        let mut stats = CollectStats::default();
        for meter in self.meters_snapshot() {
            stats.merge(meter.collect_cycle());
        }
        if let Err(e) = self.shared.processor.shutdown() {
            tracing::warn!(error = %e, "metric processor shutdown failed");
        }
        tracing::info!(
            metrics = stats.metrics,
            points = stats.points,
            failed = stats.failed,
            "meter provider shut down"
        );
        Ok(stats)
    }

    fn meters_snapshot(&self) -> Vec<Arc<Meter>> {
        self.meters.lock().clone()
    }
}

impl std::fmt::Debug for MeterProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeterProvider")
            .field("state", &self.state())
            .field("meters", &self.meters.lock().len())
            .finish()
    }
}
