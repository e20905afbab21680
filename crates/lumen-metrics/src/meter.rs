//! Named instrument registry and the collection sweep.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

use crate::aggregator::{normalize_boundaries, AggregatorKind};
use crate::error::MetricsError;
use crate::instrument::{
    Counter, Gauge, Histogram, InstrumentBuilder, InstrumentCore, InstrumentDescriptor,
    InstrumentKind, MaxGauge, Summary, SyncInstrument, UpDownCounter,
};
use crate::labels::LabelSet;
use crate::metric::Metric;
use crate::number::{Number, NumberKind};
use crate::provider::ProviderShared;
use crate::store::InstrumentStore;

/// Totals for one collection pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CollectStats {
    /// Metrics accepted by the processor.
    pub metrics: usize,
    pub points: usize,
    /// Label sets reclaimed after their grace period.
    pub evicted: usize,
    /// Metrics the processor rejected.
    pub failed: usize,
}

impl CollectStats {
    pub fn merge(&mut self, other: CollectStats) {
        self.metrics += other.metrics;
        self.points += other.points;
        self.evicted += other.evicted;
        self.failed += other.failed;
    }
}

pub struct Meter {
    name: String,
    shared: Arc<ProviderShared>,
    instruments: DashMap<String, Arc<InstrumentCore>>,
    // Declaration order, which is also processor order.
    order: RwLock<Vec<Arc<InstrumentCore>>>,
    collect_lock: Mutex<()>,
}

impl Meter {
    pub(crate) fn new(name: String, shared: Arc<ProviderShared>) -> Self {
        Self {
            name,
            shared,
            instruments: DashMap::new(),
            order: RwLock::new(Vec::new()),
            collect_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instrument_count(&self) -> usize {
        self.instruments.len()
    }

    /// Build a label set under the provider's label limits.
    pub fn labels<I, K, V>(&self, labels: I) -> LabelSet
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        LabelSet::with_limits(labels, &self.shared.config.labels)
    }

    pub fn i64_counter(&self, name: impl Into<String>) -> InstrumentBuilder<'_, Counter> {
        self.builder(name, InstrumentKind::Counter, NumberKind::I64)
    }

    pub fn f64_counter(&self, name: impl Into<String>) -> InstrumentBuilder<'_, Counter> {
        self.builder(name, InstrumentKind::Counter, NumberKind::F64)
    }

    pub fn i64_up_down_counter(
        &self,
        name: impl Into<String>,
    ) -> InstrumentBuilder<'_, UpDownCounter> {
        self.builder(name, InstrumentKind::UpDownCounter, NumberKind::I64)
    }

    pub fn f64_up_down_counter(
        &self,
        name: impl Into<String>,
    ) -> InstrumentBuilder<'_, UpDownCounter> {
        self.builder(name, InstrumentKind::UpDownCounter, NumberKind::F64)
    }

    pub fn i64_histogram(&self, name: impl Into<String>) -> InstrumentBuilder<'_, Histogram> {
        self.builder(name, InstrumentKind::Histogram, NumberKind::I64)
    }

    pub fn f64_histogram(&self, name: impl Into<String>) -> InstrumentBuilder<'_, Histogram> {
        self.builder(name, InstrumentKind::Histogram, NumberKind::F64)
    }

    pub fn i64_summary(&self, name: impl Into<String>) -> InstrumentBuilder<'_, Summary> {
        self.builder(name, InstrumentKind::Summary, NumberKind::I64)
    }

    pub fn f64_summary(&self, name: impl Into<String>) -> InstrumentBuilder<'_, Summary> {
        self.builder(name, InstrumentKind::Summary, NumberKind::F64)
    }

    pub fn i64_gauge(&self, name: impl Into<String>) -> InstrumentBuilder<'_, Gauge> {
        self.builder(name, InstrumentKind::Gauge, NumberKind::I64)
    }

    pub fn f64_gauge(&self, name: impl Into<String>) -> InstrumentBuilder<'_, Gauge> {
        self.builder(name, InstrumentKind::Gauge, NumberKind::F64)
    }

    pub fn i64_max_gauge(&self, name: impl Into<String>) -> InstrumentBuilder<'_, MaxGauge> {
        self.builder(name, InstrumentKind::MaxGauge, NumberKind::I64)
    }

    pub fn f64_max_gauge(&self, name: impl Into<String>) -> InstrumentBuilder<'_, MaxGauge> {
        self.builder(name, InstrumentKind::MaxGauge, NumberKind::F64)
    }

    fn builder<T: From<SyncInstrument>>(
        &self,
        name: impl Into<String>,
        kind: InstrumentKind,
        number_kind: NumberKind,
    ) -> InstrumentBuilder<'_, T> {
        InstrumentBuilder::new(self, InstrumentDescriptor::new(name, kind, number_kind))
    }

    /// Record against an already-registered instrument by name. Unknown
    /// names are discarded.
    pub fn record(&self, name: &str, labels: &LabelSet, value: impl Into<Number>) {
        let core = self.instruments.get(name).map(|entry| entry.value().clone());
        match core {
            Some(core) => SyncInstrument::new(core).record(value, labels),
            None => {
                tracing::debug!(meter = %self.name, instrument = name, "record for unknown instrument")
            }
        }
    }

    pub(crate) fn register(
        &self,
        descriptor: InstrumentDescriptor,
        boundaries: Option<Vec<f64>>,
    ) -> SyncInstrument {
        if !self.shared.lifecycle.is_active() {
            return SyncInstrument::noop();
        }

        match self.instruments.entry(descriptor.name.clone()) {
            Entry::Occupied(entry) => {
                let existing = entry.get();
                if existing.descriptor.kind == descriptor.kind
                    && existing.descriptor.number_kind == descriptor.number_kind
                {
                    return SyncInstrument::new(existing.clone());
                }
                let err = MetricsError::InstrumentConflict {
                    name: descriptor.name.clone(),
                    existing: existing.descriptor.kind,
                    requested: descriptor.kind,
                };
                tracing::warn!(
                    meter = %self.name,
                    error = %err,
                    existing_number_kind = ?existing.descriptor.number_kind,
                    requested_number_kind = ?descriptor.number_kind,
                    "returning no-op instrument"
                );
                SyncInstrument::noop()
            }
            Entry::Vacant(entry) => {
                let aggregation = self.aggregation_for(&descriptor, boundaries);
                let store = InstrumentStore::new(aggregation, descriptor.number_kind);
                let core = Arc::new(InstrumentCore::new(
                    descriptor,
                    store,
                    self.shared.lifecycle.clone(),
                ));
                tracing::debug!(
                    meter = %self.name,
                    instrument = %core.descriptor.name,
                    kind = ?core.descriptor.kind,
                    "registered instrument"
                );
                self.order.write().push(core.clone());
                entry.insert(core.clone());
                SyncInstrument::new(core)
            }
        }
    }

    fn aggregation_for(
        &self,
        descriptor: &InstrumentDescriptor,
        boundaries: Option<Vec<f64>>,
    ) -> AggregatorKind {
        match descriptor.kind {
            InstrumentKind::Counter => AggregatorKind::Sum { monotonic: true },
            InstrumentKind::UpDownCounter => AggregatorKind::Sum { monotonic: false },
            InstrumentKind::Summary => AggregatorKind::Summary,
            InstrumentKind::Gauge => AggregatorKind::LastValue,
            InstrumentKind::MaxGauge => AggregatorKind::Max,
            InstrumentKind::Histogram => {
                let requested = boundaries
                    .unwrap_or_else(|| self.shared.config.default_histogram_boundaries.clone());
                let (normalized, changed) = normalize_boundaries(&requested);
                if changed {
                    tracing::warn!(
                        meter = %self.name,
                        instrument = %descriptor.name,
                        requested = ?requested,
                        normalized = ?normalized,
                        "histogram boundaries normalized"
                    );
                }
                AggregatorKind::Histogram {
                    boundaries: normalized.into(),
                }
            }
        }
    }

    /// Run one collection cycle and hand the results to the processor.
    ///
    /// Every instrument is checkpointed and status-advanced before the first
    /// metric reaches the processor, so processor failures never affect
    /// bookkeeping. Does nothing once the provider is shut down.
    pub fn collect(&self) -> CollectStats {
        if !self.shared.lifecycle.is_active() {
            return CollectStats::default();
        }
        self.collect_cycle()
    }

    pub(crate) fn collect_cycle(&self) -> CollectStats {
        let mut stats = CollectStats::default();
        // The lock covers the sweep only. It is released before the
        // processor runs.
        let metrics = {
            let _guard = self.collect_lock.lock();
            let instruments: Vec<Arc<InstrumentCore>> = self.order.read().clone();
            let mut metrics = Vec::with_capacity(instruments.len());
            for core in &instruments {
                let collected = core.store.collect();
                stats.points += collected.points.len();
                stats.evicted += collected.evicted;
                metrics.push(Metric {
                    meter: self.name.clone(),
                    descriptor: core.descriptor.clone(),
                    points: collected.points,
                    collected_at: Utc::now(),
                });
            }
            metrics
        };

        for metric in metrics {
            let instrument = metric.descriptor.name.clone();
            match self.shared.processor.process(metric) {
                Ok(()) => stats.metrics += 1,
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!(meter = %self.name, %instrument, error = %e, "metric processor failed");
                }
            }
        }

        tracing::debug!(
            meter = %self.name,
            metrics = stats.metrics,
            points = stats.points,
            evicted = stats.evicted,
            failed = stats.failed,
            "collection cycle finished"
        );
        stats
    }
}

impl std::fmt::Debug for Meter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Meter")
            .field("name", &self.name)
            .field("instruments", &self.instruments.len())
            .finish()
    }
}
