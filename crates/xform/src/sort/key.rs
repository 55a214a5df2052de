use crate::xdm::{AtomicValue, PrimitiveType};
use core::cmp::Ordering;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Hashable stand-in for an atomic value under one comparer.
///
/// Two values that a comparer considers equal map to equal keys, and values
/// it considers different map to different keys. Keys carry no ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ComparisonKey {
    /// Shared by every NaN.
    NaN,
    /// Decimal with no exact double image.
    Numeric(Decimal),
    /// Bit pattern of a double; zero is unsigned.
    Double(u64),
    Boolean(bool),
    StringRaw(String),
    StringCollation(String),
    /// Calendar value normalized to UTC.
    Calendar { kind: PrimitiveType, seconds: i64, nanos: u32 },
    Duration { months: i32, nanos: i64 },
    QName { uri: Option<String>, local: String },
    Binary { kind: PrimitiveType, bytes: Vec<u8> },
}

impl ComparisonKey {
    pub fn for_double(d: f64) -> Self {
        if d.is_nan() {
            ComparisonKey::NaN
        } else if d == 0.0 {
            ComparisonKey::Double(0.0f64.to_bits())
        } else {
            ComparisonKey::Double(d.to_bits())
        }
    }
}

fn is_double(v: &AtomicValue) -> bool {
    matches!(v, AtomicValue::Double(_) | AtomicValue::Float(_))
}

fn exact(v: &AtomicValue) -> Option<Decimal> {
    v.as_decimal().map(|d| if d.is_zero() { Decimal::ZERO } else { d.normalize() })
}

/// Order two integers or decimals exactly; `None` if either is a double.
pub(crate) fn compare_decimal(a: &AtomicValue, b: &AtomicValue) -> Option<Ordering> {
    Some(exact(a)?.cmp(&exact(b)?))
}

/// Order two non-NaN numbers as doubles.
pub(crate) fn compare_double(a: &AtomicValue, b: &AtomicValue) -> Ordering {
    let x = a.as_f64().unwrap_or(f64::NAN);
    let y = b.as_f64().unwrap_or(f64::NAN);
    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
}

/// Order two non-NaN numbers. Integers and decimals compare exactly against
/// each other; as soon as one side is a double or float, both are promoted
/// to double.
pub(crate) fn compare_numeric(a: &AtomicValue, b: &AtomicValue) -> Ordering {
    if is_double(a) || is_double(b) {
        return compare_double(a, b);
    }
    compare_decimal(a, b).unwrap_or_else(|| compare_double(a, b))
}

/// Key agreeing with [`compare_numeric`].
///
/// An integer or decimal that survives the trip through a double unchanged
/// takes the key of that double, so `2` and `2.0e0` collide. A decimal with
/// no exact double image keeps a decimal key; it still compares equal to the
/// double it rounds to, which is the one place the key is finer than the
/// comparison.
pub(crate) fn numeric_key(v: &AtomicValue) -> ComparisonKey {
    if v.is_nan() {
        return ComparisonKey::NaN;
    }
    let Some(d) = exact(v) else {
        return ComparisonKey::for_double(v.as_f64().unwrap_or(f64::NAN));
    };
    match d.to_f64() {
        Some(x) if Decimal::from_f64_retain(x).is_some_and(|back| back == d) => ComparisonKey::for_double(x),
        _ => ComparisonKey::Numeric(d),
    }
}

/// Key agreeing with [`compare_double`].
pub(crate) fn double_key(v: &AtomicValue) -> ComparisonKey {
    ComparisonKey::for_double(v.as_f64().unwrap_or(f64::NAN))
}
