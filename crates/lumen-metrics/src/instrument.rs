//! Instruments and the handles application code records through.
//!
//! Every handle wraps a [`SyncInstrument`], which is either live (backed by an
//! instrument registered in a [`Meter`](crate::Meter)) or a no-op. No-op
//! handles come from kind conflicts and from shut-down providers; they accept
//! every call and discard it.

use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::bound::BoundInstrument;
use crate::error::MetricsError;
use crate::labels::LabelSet;
use crate::meter::Meter;
use crate::number::{Number, NumberKind};
use crate::provider::Lifecycle;
use crate::store::InstrumentStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    /// Monotonic sum.
    Counter,
    /// Non-monotonic sum.
    UpDownCounter,
    /// Fixed-boundary histogram.
    Histogram,
    /// Count, sum, min and max.
    Summary,
    /// Last observed value.
    Gauge,
    /// Largest observed value.
    MaxGauge,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentDescriptor {
    pub name: String,
    pub description: String,
    pub unit: String,
    pub kind: InstrumentKind,
    pub number_kind: NumberKind,
}

impl InstrumentDescriptor {
    pub fn new(name: impl Into<String>, kind: InstrumentKind, number_kind: NumberKind) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            unit: String::new(),
            kind,
            number_kind,
        }
    }
}

/// A registered instrument: its descriptor and its label-keyed store.
pub(crate) struct InstrumentCore {
    pub descriptor: InstrumentDescriptor,
    pub store: InstrumentStore,
    lifecycle: Arc<Lifecycle>,
}

impl InstrumentCore {
    pub fn new(
        descriptor: InstrumentDescriptor,
        store: InstrumentStore,
        lifecycle: Arc<Lifecycle>,
    ) -> Self {
        Self {
            descriptor,
            store,
            lifecycle,
        }
    }

    /// Reject what the instrument cannot accept and convert the rest to its
    /// number kind. Rejections are logged, never returned.
    fn accept(&self, value: Number) -> Option<Number> {
        // Checked before conversion: an i64 instrument would saturate
        // infinities and map NaN to zero.
        let reason = if !value.is_finite() {
            Some("non-finite value")
        } else if self.descriptor.kind == InstrumentKind::Counter && value.is_negative() {
            Some("negative delta on monotonic counter")
        } else {
            None
        };
        match reason {
            Some(reason) => {
                let err = MetricsError::InvalidMeasurement {
                    instrument: self.descriptor.name.clone(),
                    reason: reason.into(),
                };
                tracing::warn!(error = %err, value = %value, "discarding measurement");
                None
            }
            None => Some(value.to_kind(self.descriptor.number_kind)),
        }
    }
}

/// Untyped instrument handle shared by every instrument kind.
#[derive(Clone)]
pub struct SyncInstrument {
    core: Option<Arc<InstrumentCore>>,
}

impl SyncInstrument {
    pub(crate) fn new(core: Arc<InstrumentCore>) -> Self {
        Self { core: Some(core) }
    }

    pub fn noop() -> Self {
        Self { core: None }
    }

    pub fn is_noop(&self) -> bool {
        self.core.is_none()
    }

    pub fn descriptor(&self) -> Option<&InstrumentDescriptor> {
        self.core.as_ref().map(|c| &c.descriptor)
    }

    /// Record `value` for `labels` through the ephemeral path.
    pub fn record(&self, value: impl Into<Number>, labels: &LabelSet) {
        let Some(core) = &self.core else {
            return;
        };
        let Some(_writing) = core.lifecycle.enter() else {
            return;
        };
        if let Some(value) = core.accept(value.into()) {
            core.store.record(labels, value);
        }
    }

    /// Persistently bind `labels`. The accumulator stays registered for the
    /// lifetime of the instrument.
    pub fn bind(&self, labels: &LabelSet) -> BoundHandle {
        let entry = self.core.as_ref().and_then(|core| {
            core.lifecycle
                .is_active()
                .then(|| (core.clone(), core.store.bind(labels, true)))
        });
        BoundHandle { entry }
    }
}

/// A handle bound to one label set. Writes skip the label lookup entirely.
#[derive(Clone)]
pub struct BoundHandle {
    entry: Option<(Arc<InstrumentCore>, Arc<BoundInstrument>)>,
}

impl BoundHandle {
    pub fn is_noop(&self) -> bool {
        self.entry.is_none()
    }

    pub fn labels(&self) -> Option<&LabelSet> {
        self.entry.as_ref().map(|(_, bound)| bound.labels())
    }

    fn write(&self, value: Number) {
        let Some((core, bound)) = &self.entry else {
            return;
        };
        let Some(_writing) = core.lifecycle.enter() else {
            return;
        };
        if let Some(value) = core.accept(value) {
            bound.update(value);
        }
    }
}

macro_rules! instrument_handle {
    ($(#[$doc:meta])* $name:ident, $op:ident, $bound:ident) => {
        $(#[$doc])*
        #[derive(Clone)]
        pub struct $name {
            inner: SyncInstrument,
        }

        impl $name {
            pub fn $op(&self, value: impl Into<Number>, labels: &LabelSet) {
                self.inner.record(value, labels);
            }

            pub fn bind(&self, labels: &LabelSet) -> $bound {
                $bound {
                    inner: self.inner.bind(labels),
                }
            }

            pub fn descriptor(&self) -> Option<&InstrumentDescriptor> {
                self.inner.descriptor()
            }

            pub fn is_noop(&self) -> bool {
                self.inner.is_noop()
            }
        }

        impl From<SyncInstrument> for $name {
            fn from(inner: SyncInstrument) -> Self {
                Self { inner }
            }
        }
    };
}

macro_rules! bound_handle {
    ($(#[$doc:meta])* $name:ident, $op:ident) => {
        $(#[$doc])*
        #[derive(Clone)]
        pub struct $name {
            inner: BoundHandle,
        }

        impl $name {
            pub fn $op(&self, value: impl Into<Number>) {
                self.inner.write(value.into());
            }

            pub fn labels(&self) -> Option<&LabelSet> {
                self.inner.labels()
            }

            pub fn is_noop(&self) -> bool {
                self.inner.is_noop()
            }
        }
    };
}

instrument_handle!(
    /// Monotonic sum. Negative deltas are discarded.
    Counter, add, BoundCounter
);
instrument_handle!(
    /// Sum that may go up or down.
    UpDownCounter, add, BoundCounter
);
instrument_handle!(Histogram, record, BoundRecorder);
instrument_handle!(Summary, record, BoundRecorder);
instrument_handle!(
    /// Reports the most recent value per label set.
    Gauge, record, BoundRecorder
);
instrument_handle!(MaxGauge, record, BoundRecorder);

bound_handle!(BoundCounter, add);
bound_handle!(BoundRecorder, record);

/// Configures an instrument before registering it with its meter.
pub struct InstrumentBuilder<'a, T> {
    meter: &'a Meter,
    descriptor: InstrumentDescriptor,
    boundaries: Option<Vec<f64>>,
    _marker: PhantomData<T>,
}

impl<'a, T: From<SyncInstrument>> InstrumentBuilder<'a, T> {
    pub(crate) fn new(meter: &'a Meter, descriptor: InstrumentDescriptor) -> Self {
        Self {
            meter,
            descriptor,
            boundaries: None,
            _marker: PhantomData,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.descriptor.description = description.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.descriptor.unit = unit.into();
        self
    }

    /// Histogram bucket boundaries. Ignored by other instrument kinds.
    pub fn with_boundaries(mut self, boundaries: impl Into<Vec<f64>>) -> Self {
        self.boundaries = Some(boundaries.into());
        self
    }

    pub fn init(self) -> T {
        T::from(self.meter.register(self.descriptor, self.boundaries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AggregatorKind;

    fn core(kind: InstrumentKind, number_kind: NumberKind) -> Arc<InstrumentCore> {
        let aggregation = match kind {
            InstrumentKind::Counter => AggregatorKind::Sum { monotonic: true },
            InstrumentKind::UpDownCounter => AggregatorKind::Sum { monotonic: false },
            _ => AggregatorKind::LastValue,
        };
        Arc::new(InstrumentCore::new(
            InstrumentDescriptor::new("test", kind, number_kind),
            InstrumentStore::new(aggregation, number_kind),
            Arc::new(Lifecycle::new()),
        ))
    }

    fn sum(core: &InstrumentCore, labels: &LabelSet) -> Option<Number> {
        core.store
            .collect()
            .points
            .into_iter()
            .find(|p| &p.labels == labels)
            .and_then(|p| p.point.data.value())
    }

    #[test]
    fn test_counter_rejects_negative() {
        let core = core(InstrumentKind::Counter, NumberKind::I64);
        let counter = Counter::from(SyncInstrument::new(core.clone()));
        let labels = LabelSet::new([("a", "b")]);
        counter.add(5, &labels);
        counter.add(-3, &labels);
        assert_eq!(sum(&core, &labels), Some(Number::I64(5)));
    }

    #[test]
    fn test_up_down_counter_accepts_negative() {
        let core = core(InstrumentKind::UpDownCounter, NumberKind::I64);
        let counter = UpDownCounter::from(SyncInstrument::new(core.clone()));
        let labels = LabelSet::empty();
        counter.add(5, &labels);
        counter.add(-3, &labels);
        assert_eq!(sum(&core, &labels), Some(Number::I64(2)));
    }

    #[test]
    fn test_non_finite_discarded() {
        let core = core(InstrumentKind::Gauge, NumberKind::F64);
        let gauge = Gauge::from(SyncInstrument::new(core.clone()));
        let labels = LabelSet::empty();
        gauge.record(1.5, &labels);
        gauge.record(f64::NAN, &labels);
        gauge.record(f64::INFINITY, &labels);
        assert_eq!(sum(&core, &labels), Some(Number::F64(1.5)));
    }

    #[test]
    fn test_non_finite_discarded_on_i64_instruments() {
        let labels = LabelSet::empty();

        let core_counter = core(InstrumentKind::Counter, NumberKind::I64);
        let counter = Counter::from(SyncInstrument::new(core_counter.clone()));
        counter.add(f64::INFINITY, &labels);
        counter.add(f64::NAN, &labels);
        counter.bind(&labels).add(f64::INFINITY);
        assert_eq!(sum(&core_counter, &labels), Some(Number::I64(0)));

        let core_gauge = core(InstrumentKind::Gauge, NumberKind::I64);
        let gauge = Gauge::from(SyncInstrument::new(core_gauge.clone()));
        gauge.record(4, &labels);
        gauge.record(f64::NEG_INFINITY, &labels);
        gauge.record(f64::NAN, &labels);
        assert_eq!(sum(&core_gauge, &labels), Some(Number::I64(4)));
    }

    #[test]
    fn test_values_converted_to_instrument_kind() {
        let core = core(InstrumentKind::Counter, NumberKind::F64);
        let counter = Counter::from(SyncInstrument::new(core.clone()));
        let labels = LabelSet::empty();
        counter.add(2, &labels);
        counter.add(0.5, &labels);
        assert_eq!(sum(&core, &labels), Some(Number::F64(2.5)));
    }

    #[test]
    fn test_bound_counter() {
        let core = core(InstrumentKind::Counter, NumberKind::I64);
        let counter = Counter::from(SyncInstrument::new(core.clone()));
        let labels = LabelSet::new([("k", "v")]);
        let bound = counter.bind(&labels);
        assert!(!bound.is_noop());
        assert_eq!(bound.labels(), Some(&labels));
        bound.add(2);
        bound.add(-1);
        bound.add(3);
        assert_eq!(sum(&core, &labels), Some(Number::I64(5)));
    }

    #[test]
    fn test_noop_handles() {
        let counter = Counter::from(SyncInstrument::noop());
        assert!(counter.is_noop());
        assert!(counter.descriptor().is_none());
        counter.add(1, &LabelSet::empty());
        let bound = counter.bind(&LabelSet::empty());
        assert!(bound.is_noop());
        bound.add(1);
    }

    #[test]
    fn test_shut_down_lifecycle_discards() {
        let core = core(InstrumentKind::Counter, NumberKind::I64);
        let counter = Counter::from(SyncInstrument::new(core.clone()));
        let labels = LabelSet::empty();
        counter.add(1, &labels);
        core.lifecycle.shut_down();
        counter.add(1, &labels);
        assert!(counter.bind(&labels).is_noop());
        assert_eq!(sum(&core, &labels), Some(Number::I64(1)));
    }
}
