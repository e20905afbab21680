//! Measurement values.
//!
//! Every instrument fixes a [`NumberKind`] at creation. Values travel as the
//! tagged [`Number`] and are stored in aggregators as [`AtomicNumber`], a single
//! `u64` cell that holds either an `i64` or the bits of an `f64`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumberKind {
    I64,
    F64,
}

/// A single measurement or aggregated value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Number {
    I64(i64),
    F64(f64),
}

impl Number {
    pub fn zero(kind: NumberKind) -> Self {
        match kind {
            NumberKind::I64 => Number::I64(0),
            NumberKind::F64 => Number::F64(0.0),
        }
    }

    pub fn kind(&self) -> NumberKind {
        match self {
            Number::I64(_) => NumberKind::I64,
            Number::F64(_) => NumberKind::F64,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            Number::I64(v) => v as f64,
            Number::F64(v) => v,
        }
    }

    /// Convert into `kind`. Floats are truncated toward zero (saturating) when
    /// the target is `I64`.
    pub fn to_kind(self, kind: NumberKind) -> Self {
        match (self, kind) {
            (Number::I64(v), NumberKind::F64) => Number::F64(v as f64),
            (Number::F64(v), NumberKind::I64) => Number::I64(v as i64),
            (n, _) => n,
        }
    }

    pub fn is_negative(&self) -> bool {
        match *self {
            Number::I64(v) => v < 0,
            Number::F64(v) => v < 0.0,
        }
    }

    pub fn is_finite(&self) -> bool {
        match *self {
            Number::I64(_) => true,
            Number::F64(v) => v.is_finite(),
        }
    }

    /// Sum of two values of the same kind. `I64` addition wraps.
    pub(crate) fn add(self, other: Number) -> Number {
        match (self, other.to_kind(self.kind())) {
            (Number::I64(a), Number::I64(b)) => Number::I64(a.wrapping_add(b)),
            (a, b) => Number::F64(a.as_f64() + b.as_f64()),
        }
    }

    pub(crate) fn max(self, other: Number) -> Number {
        if other.gt(&self) {
            other
        } else {
            self
        }
    }

    pub(crate) fn min(self, other: Number) -> Number {
        if other.lt(&self) {
            other
        } else {
            self
        }
    }

    fn gt(&self, other: &Number) -> bool {
        match (*self, *other) {
            (Number::I64(a), Number::I64(b)) => a > b,
            (a, b) => a.as_f64() > b.as_f64(),
        }
    }

    fn lt(&self, other: &Number) -> bool {
        match (*self, *other) {
            (Number::I64(a), Number::I64(b)) => a < b,
            (a, b) => a.as_f64() < b.as_f64(),
        }
    }

    fn to_bits(self) -> u64 {
        match self {
            Number::I64(v) => v as u64,
            Number::F64(v) => v.to_bits(),
        }
    }

    fn from_bits(kind: NumberKind, bits: u64) -> Number {
        match kind {
            NumberKind::I64 => Number::I64(bits as i64),
            NumberKind::F64 => Number::F64(f64::from_bits(bits)),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::I64(v) => write!(f, "{}", v),
            Number::F64(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for Number {
    fn from(v: i64) -> Self {
        Number::I64(v)
    }
}

impl From<i32> for Number {
    fn from(v: i32) -> Self {
        Number::I64(v as i64)
    }
}

impl From<u32> for Number {
    fn from(v: u32) -> Self {
        Number::I64(v as i64)
    }
}

impl From<u64> for Number {
    fn from(v: u64) -> Self {
        Number::I64(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Number {
    fn from(v: f64) -> Self {
        Number::F64(v)
    }
}

/// Lock-free storage for a [`Number`] of a fixed kind.
pub(crate) struct AtomicNumber {
    kind: NumberKind,
    bits: AtomicU64,
}

impl AtomicNumber {
    pub fn new(value: Number) -> Self {
        Self {
            kind: value.kind(),
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    pub fn kind(&self) -> NumberKind {
        self.kind
    }

    pub fn load(&self) -> Number {
        Number::from_bits(self.kind, self.bits.load(Ordering::Acquire))
    }

    pub fn swap(&self, value: Number) -> Number {
        let bits = value.to_kind(self.kind).to_bits();
        Number::from_bits(self.kind, self.bits.swap(bits, Ordering::AcqRel))
    }

    pub fn fetch_add(&self, delta: Number) -> Number {
        match self.kind {
            NumberKind::I64 => {
                let delta = delta.to_kind(NumberKind::I64).to_bits();
                Number::from_bits(self.kind, self.bits.fetch_add(delta, Ordering::AcqRel))
            }
            NumberKind::F64 => {
                let delta = delta.as_f64();
                self.update(|current| Some(Number::F64(current.as_f64() + delta)))
            }
        }
    }

    pub fn fetch_max(&self, value: Number) -> Number {
        let value = value.to_kind(self.kind);
        self.update(|current| value.gt(&current).then_some(value))
    }

    /// Compare-and-exchange loop. `f` returns `None` to leave the cell as is.
    fn update(&self, f: impl Fn(Number) -> Option<Number>) -> Number {
        let mut current_bits = self.bits.load(Ordering::Acquire);
        loop {
            let current = Number::from_bits(self.kind, current_bits);
            let Some(next) = f(current) else {
                return current;
            };
            match self.bits.compare_exchange_weak(
                current_bits,
                next.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return current,
                Err(actual) => current_bits = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion() {
        assert_eq!(Number::from(3i64).to_kind(NumberKind::F64), Number::F64(3.0));
        assert_eq!(Number::from(2.9).to_kind(NumberKind::I64), Number::I64(2));
        assert_eq!(Number::from(u64::MAX), Number::I64(i64::MAX));
    }

    #[test]
    fn test_add_and_compare() {
        assert_eq!(Number::I64(2).add(Number::I64(3)), Number::I64(5));
        assert_eq!(Number::F64(0.5).add(Number::I64(1)), Number::F64(1.5));
        assert_eq!(Number::I64(2).max(Number::I64(7)), Number::I64(7));
        assert_eq!(Number::F64(-1.0).min(Number::F64(-4.0)), Number::F64(-4.0));
    }

    #[test]
    fn test_atomic_i64_ops() {
        let cell = AtomicNumber::new(Number::I64(0));
        cell.fetch_add(Number::I64(5));
        cell.fetch_add(Number::I64(-2));
        assert_eq!(cell.load(), Number::I64(3));
        cell.fetch_max(Number::I64(1));
        assert_eq!(cell.load(), Number::I64(3));
        cell.fetch_max(Number::I64(10));
        assert_eq!(cell.swap(Number::I64(0)), Number::I64(10));
        assert_eq!(cell.load(), Number::I64(0));
    }

    #[test]
    fn test_atomic_f64_concurrent_add() {
        let cell = AtomicNumber::new(Number::F64(0.0));
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        cell.fetch_add(Number::F64(0.5));
                    }
                });
            }
        });
        assert_eq!(cell.load(), Number::F64(4000.0));
    }

    #[test]
    fn test_serialize_untagged() {
        assert_eq!(serde_json::to_string(&Number::I64(7)).unwrap(), "7");
        assert_eq!(serde_json::to_string(&Number::F64(1.5)).unwrap(), "1.5");
    }
}
