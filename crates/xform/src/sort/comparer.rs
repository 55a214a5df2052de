//! Comparison strategies used for sorting and grouping atomic values.
//!
//! A comparer is chosen once per sort key, from the static type of the key
//! and the resolved `xsl:sort` attributes, and then applied to every pair of
//! key values. `None` stands for the empty sequence throughout.

use super::key::{ComparisonKey, compare_decimal, compare_double, compare_numeric, double_key, numeric_key};
use crate::collation::{CODEPOINT_URI, CodepointCollation, Collation};
use crate::context::DynamicContext;
use crate::error::{Error, ErrorCode};
use crate::xdm::{AtomicValue, PrimitiveType, parse_xs_double};
use chrono::FixedOffset;
use core::cmp::Ordering;
use core::fmt;
use std::sync::{Arc, LazyLock};

pub trait AtomicComparer: Send + Sync + fmt::Debug {
    /// Order two values. Values of types that cannot be ordered against each
    /// other raise `XPTY0004`.
    fn compare_atomic_values(&self, a: Option<&AtomicValue>, b: Option<&AtomicValue>) -> Result<Ordering, Error>;

    fn compares_equal(&self, a: &AtomicValue, b: &AtomicValue) -> Result<bool, Error> {
        Ok(self.compare_atomic_values(Some(a), Some(b))?.is_eq())
    }

    /// Key that is equal for two values exactly when `compares_equal` holds.
    fn comparison_key(&self, a: &AtomicValue) -> Result<ComparisonKey, Error>;

    fn string_collator(&self) -> Option<Arc<dyn Collation>> {
        None
    }

    /// Short description of the comparer stack, for traces.
    fn describe(&self) -> String;
}

/// Empty sorts before everything; two empties are equal.
fn empty_least(
    a: Option<&AtomicValue>,
    b: Option<&AtomicValue>,
    f: impl FnOnce(&AtomicValue, &AtomicValue) -> Result<Ordering, Error>,
) -> Result<Ordering, Error> {
    match (a, b) {
        (None, None) => Ok(Ordering::Equal),
        (None, Some(_)) => Ok(Ordering::Less),
        (Some(_), None) => Ok(Ordering::Greater),
        (Some(x), Some(y)) => f(x, y),
    }
}

/// NaN sorts before every other value; two NaNs are equal.
fn nan_least(a: &AtomicValue, b: &AtomicValue) -> Option<Ordering> {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Some(Ordering::Equal),
        (true, false) => Some(Ordering::Less),
        (false, true) => Some(Ordering::Greater),
        (false, false) => None,
    }
}

fn as_str(v: &AtomicValue) -> Option<&str> {
    match v {
        AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) | AtomicValue::AnyUri(s) => Some(s),
        _ => None,
    }
}

fn not_comparable(a: &AtomicValue, b: &AtomicValue) -> Error {
    Error::not_comparable(a.type_name(), b.type_name())
}

fn string_key(collation: &dyn Collation, s: &str) -> ComparisonKey {
    if collation.uri() == CODEPOINT_URI {
        ComparisonKey::StringRaw(s.to_string())
    } else {
        ComparisonKey::StringCollation(collation.key(s))
    }
}

fn calendar_key(v: &AtomicValue, implicit_tz: FixedOffset) -> Option<ComparisonKey> {
    let (seconds, nanos) = v.to_instant(implicit_tz)?;
    Some(ComparisonKey::Calendar { kind: v.primitive_type(), seconds, nanos })
}

fn compare_calendar(a: &AtomicValue, b: &AtomicValue, implicit_tz: FixedOffset) -> Result<Ordering, Error> {
    if a.primitive_type() != b.primitive_type() {
        return Err(not_comparable(a, b));
    }
    match (a.to_instant(implicit_tz), b.to_instant(implicit_tz)) {
        (Some(x), Some(y)) => Ok(x.cmp(&y)),
        _ => Err(not_comparable(a, b)),
    }
}

/// Durations are ordered when both lie on the same axis: both have no day-time
/// part, or both have no year-month part.
fn compare_durations(a: &AtomicValue, b: &AtomicValue) -> Result<Ordering, Error> {
    match (a.duration_parts(), b.duration_parts()) {
        (Some((m1, n1)), Some((m2, n2))) if n1 == 0 && n2 == 0 => Ok(m1.cmp(&m2)),
        (Some((m1, n1)), Some((m2, n2))) if m1 == 0 && m2 == 0 => Ok(n1.cmp(&n2)),
        _ => Err(not_comparable(a, b)),
    }
}

/// Singleton comparing strings by Unicode codepoint.
#[derive(Debug, Default)]
pub struct CodepointCollatingComparer;

static CODEPOINT_COMPARER: LazyLock<Arc<dyn AtomicComparer>> = LazyLock::new(|| Arc::new(CodepointCollatingComparer));

impl CodepointCollatingComparer {
    pub fn instance() -> Arc<dyn AtomicComparer> {
        CODEPOINT_COMPARER.clone()
    }
}

impl AtomicComparer for CodepointCollatingComparer {
    fn compare_atomic_values(&self, a: Option<&AtomicValue>, b: Option<&AtomicValue>) -> Result<Ordering, Error> {
        empty_least(a, b, |x, y| match (as_str(x), as_str(y)) {
            (Some(s), Some(t)) => Ok(s.cmp(t)),
            _ => Err(not_comparable(x, y)),
        })
    }

    fn comparison_key(&self, a: &AtomicValue) -> Result<ComparisonKey, Error> {
        Ok(ComparisonKey::StringRaw(a.string_value()))
    }

    fn string_collator(&self) -> Option<Arc<dyn Collation>> {
        Some(Arc::new(CodepointCollation))
    }

    fn describe(&self) -> String {
        "codepoint".to_string()
    }
}

/// Compares string-like values under an arbitrary collation.
#[derive(Debug, Clone)]
pub struct CollatingAtomicComparer {
    collation: Arc<dyn Collation>,
}

impl CollatingAtomicComparer {
    pub fn new(collation: Arc<dyn Collation>) -> Self {
        Self { collation }
    }
}

impl AtomicComparer for CollatingAtomicComparer {
    fn compare_atomic_values(&self, a: Option<&AtomicValue>, b: Option<&AtomicValue>) -> Result<Ordering, Error> {
        empty_least(a, b, |x, y| match (as_str(x), as_str(y)) {
            (Some(s), Some(t)) => Ok(self.collation.compare(s, t)),
            _ => Err(not_comparable(x, y)),
        })
    }

    fn comparison_key(&self, a: &AtomicValue) -> Result<ComparisonKey, Error> {
        Ok(string_key(self.collation.as_ref(), &a.string_value()))
    }

    fn string_collator(&self) -> Option<Arc<dyn Collation>> {
        Some(self.collation.clone())
    }

    fn describe(&self) -> String {
        format!("collating({})", self.collation.uri())
    }
}

/// Singleton for values statically known to be integers or decimals.
#[derive(Debug, Default)]
pub struct DecimalSortComparer;

static DECIMAL_COMPARER: LazyLock<Arc<dyn AtomicComparer>> = LazyLock::new(|| Arc::new(DecimalSortComparer));

impl DecimalSortComparer {
    pub fn instance() -> Arc<dyn AtomicComparer> {
        DECIMAL_COMPARER.clone()
    }
}

impl AtomicComparer for DecimalSortComparer {
    fn compare_atomic_values(&self, a: Option<&AtomicValue>, b: Option<&AtomicValue>) -> Result<Ordering, Error> {
        empty_least(a, b, |x, y| {
            if !x.is_numeric() || !y.is_numeric() {
                return Err(not_comparable(x, y));
            }
            Ok(compare_decimal(x, y)
                .or_else(|| nan_least(x, y))
                .unwrap_or_else(|| compare_numeric(x, y)))
        })
    }

    fn comparison_key(&self, a: &AtomicValue) -> Result<ComparisonKey, Error> {
        Ok(numeric_key(a))
    }

    fn describe(&self) -> String {
        "decimal".to_string()
    }
}

/// Singleton for doubles and floats. NaN sorts lowest and equals itself.
#[derive(Debug, Default)]
pub struct DoubleSortComparer;

static DOUBLE_COMPARER: LazyLock<Arc<dyn AtomicComparer>> = LazyLock::new(|| Arc::new(DoubleSortComparer));

impl DoubleSortComparer {
    pub fn instance() -> Arc<dyn AtomicComparer> {
        DOUBLE_COMPARER.clone()
    }
}

impl AtomicComparer for DoubleSortComparer {
    fn compare_atomic_values(&self, a: Option<&AtomicValue>, b: Option<&AtomicValue>) -> Result<Ordering, Error> {
        empty_least(a, b, |x, y| {
            if !x.is_numeric() || !y.is_numeric() {
                return Err(not_comparable(x, y));
            }
            Ok(nan_least(x, y).unwrap_or_else(|| compare_double(x, y)))
        })
    }

    fn comparison_key(&self, a: &AtomicValue) -> Result<ComparisonKey, Error> {
        Ok(double_key(a))
    }

    fn describe(&self) -> String {
        "double".to_string()
    }
}

/// Dates, times and dateTimes, with the implicit timezone applied to values
/// that carry none.
#[derive(Debug, Clone)]
pub struct CalendarValueComparer {
    implicit_timezone: FixedOffset,
}

impl CalendarValueComparer {
    pub fn new(implicit_timezone: FixedOffset) -> Self {
        Self { implicit_timezone }
    }
}

impl AtomicComparer for CalendarValueComparer {
    fn compare_atomic_values(&self, a: Option<&AtomicValue>, b: Option<&AtomicValue>) -> Result<Ordering, Error> {
        empty_least(a, b, |x, y| compare_calendar(x, y, self.implicit_timezone))
    }

    fn comparison_key(&self, a: &AtomicValue) -> Result<ComparisonKey, Error> {
        calendar_key(a, self.implicit_timezone).ok_or_else(|| {
            Error::from_code(ErrorCode::XPTY0004, format!("{} is not a date, time or dateTime", a.type_name()))
        })
    }

    fn describe(&self) -> String {
        format!("calendar({})", self.implicit_timezone)
    }
}

/// General-purpose comparer for keys whose type is not known statically.
///
/// Empty sorts first and NaN next. An untyped value compared with a string
/// is compared as a string; compared with anything else it is first cast to
/// the other value's type. Strings only compare with strings. Everything else
/// uses the value's own ordering where it has one.
#[derive(Debug, Clone)]
pub struct AtomicSortComparer {
    collation: Arc<dyn Collation>,
    implicit_timezone: FixedOffset,
}

impl AtomicSortComparer {
    pub fn new(collation: Arc<dyn Collation>, implicit_timezone: FixedOffset) -> Self {
        Self { collation, implicit_timezone }
    }

    fn compare_values(&self, a: &AtomicValue, b: &AtomicValue) -> Result<Ordering, Error> {
        if let Some(ord) = nan_least(a, b) {
            return Ok(ord);
        }
        match (a, b) {
            (AtomicValue::UntypedAtomic(s), other) | (other, AtomicValue::UntypedAtomic(s))
                if !other.primitive_type().is_string_like() =>
            {
                let converted = AtomicValue::convert_untyped(s, other.primitive_type())
                    .map_err(|e| not_comparable(a, b).with_source(Some(Arc::new(e) as Arc<dyn std::error::Error + Send + Sync>)))?;
                if matches!(a, AtomicValue::UntypedAtomic(_)) {
                    self.compare_values(&converted, b)
                } else {
                    self.compare_values(a, &converted)
                }
            }
            _ => match (as_str(a), as_str(b)) {
                (Some(s), Some(t)) => Ok(self.collation.compare(s, t)),
                (Some(_), None) | (None, Some(_)) => Err(not_comparable(a, b)),
                (None, None) => self.compare_natural(a, b),
            },
        }
    }

    fn compare_natural(&self, a: &AtomicValue, b: &AtomicValue) -> Result<Ordering, Error> {
        let (ta, tb) = (a.primitive_type(), b.primitive_type());
        if ta.is_numeric() && tb.is_numeric() {
            Ok(compare_numeric(a, b))
        } else if ta.is_calendar() && tb.is_calendar() {
            compare_calendar(a, b, self.implicit_timezone)
        } else if ta.is_duration() && tb.is_duration() {
            compare_durations(a, b)
        } else {
            match (a, b) {
                (AtomicValue::Boolean(x), AtomicValue::Boolean(y)) => Ok(x.cmp(y)),
                (AtomicValue::Base64Binary(x), AtomicValue::Base64Binary(y))
                | (AtomicValue::HexBinary(x), AtomicValue::HexBinary(y)) => Ok(x.cmp(y)),
                _ => Err(not_comparable(a, b)),
            }
        }
    }
}

impl AtomicComparer for AtomicSortComparer {
    fn compare_atomic_values(&self, a: Option<&AtomicValue>, b: Option<&AtomicValue>) -> Result<Ordering, Error> {
        empty_least(a, b, |x, y| self.compare_values(x, y))
    }

    fn compares_equal(&self, a: &AtomicValue, b: &AtomicValue) -> Result<bool, Error> {
        match (a, b) {
            (
                AtomicValue::QName { ns_uri: u1, local: l1, .. },
                AtomicValue::QName { ns_uri: u2, local: l2, .. },
            ) => Ok(u1 == u2 && l1 == l2),
            _ if a.primitive_type().is_duration() && b.primitive_type().is_duration() => {
                Ok(a.duration_parts() == b.duration_parts())
            }
            _ => Ok(self.compare_values(a, b)?.is_eq()),
        }
    }

    fn comparison_key(&self, a: &AtomicValue) -> Result<ComparisonKey, Error> {
        let ty = a.primitive_type();
        Ok(match a {
            _ if ty.is_numeric() => numeric_key(a),
            _ if ty.is_calendar() => calendar_key(a, self.implicit_timezone)
                .ok_or_else(|| Error::from_code(ErrorCode::XPTY0004, format!("invalid {}", a.type_name())))?,
            _ if ty.is_duration() => {
                let (months, nanos) = a.duration_parts().unwrap_or_default();
                ComparisonKey::Duration { months, nanos }
            }
            AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) | AtomicValue::AnyUri(s) => {
                string_key(self.collation.as_ref(), s)
            }
            AtomicValue::Boolean(b) => ComparisonKey::Boolean(*b),
            AtomicValue::QName { ns_uri, local, .. } => ComparisonKey::QName { uri: ns_uri.clone(), local: local.clone() },
            AtomicValue::Base64Binary(bytes) | AtomicValue::HexBinary(bytes) => {
                ComparisonKey::Binary { kind: ty, bytes: bytes.clone() }
            }
            _ => return Err(Error::from_code(ErrorCode::XPTY0004, format!("no comparison key for {}", a.type_name()))),
        })
    }

    fn string_collator(&self) -> Option<Arc<dyn Collation>> {
        Some(self.collation.clone())
    }

    fn describe(&self) -> String {
        format!("atomic-sort({})", self.collation.uri())
    }
}

/// `data-type="number"`: every value is converted to a double first.
/// Strings that are not numbers become NaN.
#[derive(Debug, Clone, Copy)]
pub struct NumericComparer {
    xsd11: bool,
}

static NUMERIC_COMPARER: LazyLock<Arc<dyn AtomicComparer>> =
    LazyLock::new(|| Arc::new(NumericComparer { xsd11: false }));
static NUMERIC_COMPARER_11: LazyLock<Arc<dyn AtomicComparer>> =
    LazyLock::new(|| Arc::new(NumericComparer { xsd11: true }));

impl NumericComparer {
    /// XSD 1.0 lexical rules.
    pub fn instance() -> Arc<dyn AtomicComparer> {
        NUMERIC_COMPARER.clone()
    }

    /// XSD 1.1 lexical rules, which also accept `+INF`.
    pub fn instance_11() -> Arc<dyn AtomicComparer> {
        NUMERIC_COMPARER_11.clone()
    }

    pub fn to_double(&self, v: &AtomicValue) -> f64 {
        match v.as_f64() {
            Some(d) => d,
            None => parse_xs_double(v.string_value().trim(), self.xsd11).unwrap_or(f64::NAN),
        }
    }
}

impl AtomicComparer for NumericComparer {
    fn compare_atomic_values(&self, a: Option<&AtomicValue>, b: Option<&AtomicValue>) -> Result<Ordering, Error> {
        let x = a.map_or(f64::NAN, |v| self.to_double(v));
        let y = b.map_or(f64::NAN, |v| self.to_double(v));
        Ok(match (x.is_nan(), y.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        })
    }

    fn comparison_key(&self, a: &AtomicValue) -> Result<ComparisonKey, Error> {
        Ok(ComparisonKey::for_double(self.to_double(a)))
    }

    fn describe(&self) -> String {
        if self.xsd11 { "number(1.1)".to_string() } else { "number".to_string() }
    }
}

/// `data-type="text"`: values are compared by their string values.
#[derive(Debug, Clone)]
pub struct TextComparer {
    base: Arc<dyn AtomicComparer>,
}

impl TextComparer {
    pub fn new(base: Arc<dyn AtomicComparer>) -> Self {
        Self { base }
    }

    fn to_text(v: &AtomicValue) -> AtomicValue {
        match v {
            AtomicValue::String(_) => v.clone(),
            other => AtomicValue::String(other.string_value()),
        }
    }
}

impl AtomicComparer for TextComparer {
    fn compare_atomic_values(&self, a: Option<&AtomicValue>, b: Option<&AtomicValue>) -> Result<Ordering, Error> {
        let a = a.map(Self::to_text);
        let b = b.map(Self::to_text);
        self.base.compare_atomic_values(a.as_ref(), b.as_ref())
    }

    fn compares_equal(&self, a: &AtomicValue, b: &AtomicValue) -> Result<bool, Error> {
        self.base.compares_equal(&Self::to_text(a), &Self::to_text(b))
    }

    fn comparison_key(&self, a: &AtomicValue) -> Result<ComparisonKey, Error> {
        self.base.comparison_key(&Self::to_text(a))
    }

    fn string_collator(&self) -> Option<Arc<dyn Collation>> {
        self.base.string_collator()
    }

    fn describe(&self) -> String {
        format!("text({})", self.base.describe())
    }
}

/// Sorts the empty sequence after every value, and NaN after every other
/// non-empty value.
#[derive(Debug, Clone)]
pub struct EmptyGreatestComparer {
    base: Arc<dyn AtomicComparer>,
}

impl EmptyGreatestComparer {
    pub fn new(base: Arc<dyn AtomicComparer>) -> Self {
        Self { base }
    }
}

impl AtomicComparer for EmptyGreatestComparer {
    fn compare_atomic_values(&self, a: Option<&AtomicValue>, b: Option<&AtomicValue>) -> Result<Ordering, Error> {
        match (a, b) {
            (None, None) => Ok(Ordering::Equal),
            (None, Some(_)) => Ok(Ordering::Greater),
            (Some(_), None) => Ok(Ordering::Less),
            (Some(x), Some(y)) => match nan_least(x, y) {
                Some(ord) => Ok(ord.reverse()),
                None => self.base.compare_atomic_values(a, b),
            },
        }
    }

    fn compares_equal(&self, a: &AtomicValue, b: &AtomicValue) -> Result<bool, Error> {
        self.base.compares_equal(a, b)
    }

    fn comparison_key(&self, a: &AtomicValue) -> Result<ComparisonKey, Error> {
        self.base.comparison_key(a)
    }

    fn string_collator(&self) -> Option<Arc<dyn Collation>> {
        self.base.string_collator()
    }

    fn describe(&self) -> String {
        format!("empty-greatest({})", self.base.describe())
    }
}

/// Reverses the order of another comparer; equality is unchanged.
#[derive(Debug, Clone)]
pub struct DescendingComparer {
    base: Arc<dyn AtomicComparer>,
}

impl DescendingComparer {
    pub fn new(base: Arc<dyn AtomicComparer>) -> Self {
        Self { base }
    }

    pub fn base(&self) -> &Arc<dyn AtomicComparer> {
        &self.base
    }
}

impl AtomicComparer for DescendingComparer {
    fn compare_atomic_values(&self, a: Option<&AtomicValue>, b: Option<&AtomicValue>) -> Result<Ordering, Error> {
        Ok(self.base.compare_atomic_values(a, b)?.reverse())
    }

    fn compares_equal(&self, a: &AtomicValue, b: &AtomicValue) -> Result<bool, Error> {
        self.base.compares_equal(a, b)
    }

    fn comparison_key(&self, a: &AtomicValue) -> Result<ComparisonKey, Error> {
        self.base.comparison_key(a)
    }

    fn string_collator(&self) -> Option<Arc<dyn Collation>> {
        self.base.string_collator()
    }

    fn describe(&self) -> String {
        format!("descending({})", self.base.describe())
    }
}

/// Pick the comparer for sort key values of static type `ty`.
pub fn make_sort_comparer(
    collation: Option<Arc<dyn Collation>>,
    ty: PrimitiveType,
    ctx: &DynamicContext,
) -> Arc<dyn AtomicComparer> {
    let collation = collation.unwrap_or_else(|| ctx.collations().codepoint());
    match ty {
        _ if ty.is_string_like() => {
            if collation.uri() == CODEPOINT_URI {
                CodepointCollatingComparer::instance()
            } else {
                Arc::new(CollatingAtomicComparer::new(collation))
            }
        }
        PrimitiveType::Decimal => DecimalSortComparer::instance(),
        PrimitiveType::Double | PrimitiveType::Float | PrimitiveType::Numeric => DoubleSortComparer::instance(),
        _ if ty.is_calendar() => Arc::new(CalendarValueComparer::new(ctx.implicit_timezone())),
        _ => Arc::new(AtomicSortComparer::new(collation, ctx.implicit_timezone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collation::{CollationRegistry, SIMPLE_CASE_URI, UppercaseFirstCollation};
    use crate::context::DynamicContextBuilder;
    use crate::error::ErrorCategory;
    use chrono::Offset;
    use rstest::{fixture, rstest};
    use rust_decimal::Decimal;

    #[fixture]
    fn generic() -> AtomicSortComparer {
        AtomicSortComparer::new(Arc::new(CodepointCollation), chrono::Utc.fix())
    }

    fn cmp(c: &dyn AtomicComparer, a: &AtomicValue, b: &AtomicValue) -> Result<Ordering, Error> {
        c.compare_atomic_values(Some(a), Some(b))
    }

    #[rstest]
    fn string_against_boolean_is_not_comparable(generic: AtomicSortComparer) {
        let err = cmp(&generic, &AtomicValue::string("true"), &AtomicValue::Boolean(true)).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::NotComparable);
        assert!(err.message.contains("xs:string") && err.message.contains("xs:boolean"));
        let err = cmp(&CodepointCollatingComparer, &AtomicValue::string("a"), &AtomicValue::Boolean(false)).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::XPTY0004);
    }

    #[rstest]
    #[case(AtomicValue::untyped("10"), AtomicValue::Integer(9), Ordering::Greater)]
    #[case(AtomicValue::Integer(9), AtomicValue::untyped("10"), Ordering::Less)]
    #[case(AtomicValue::untyped("b"), AtomicValue::string("a"), Ordering::Greater)]
    #[case(AtomicValue::untyped("10"), AtomicValue::untyped("9"), Ordering::Less)]
    #[case(AtomicValue::untyped("true"), AtomicValue::Boolean(false), Ordering::Greater)]
    #[case(AtomicValue::untyped("P1D"), AtomicValue::DayTimeDuration(3_600_000_000_000), Ordering::Greater)]
    fn untyped_takes_the_other_type(
        generic: AtomicSortComparer,
        #[case] a: AtomicValue,
        #[case] b: AtomicValue,
        #[case] expected: Ordering,
    ) {
        assert_eq!(cmp(&generic, &a, &b).unwrap(), expected);
    }

    #[rstest]
    fn unconvertible_untyped_is_not_comparable(generic: AtomicSortComparer) {
        let err = cmp(&generic, &AtomicValue::untyped("ten"), &AtomicValue::Integer(1)).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::XPTY0004);
    }

    #[rstest]
    #[case(AtomicValue::Double(f64::NAN), AtomicValue::Double(f64::NEG_INFINITY), Ordering::Less)]
    #[case(AtomicValue::Double(f64::NAN), AtomicValue::Float(f32::NAN), Ordering::Equal)]
    #[case(AtomicValue::Integer(1), AtomicValue::Double(f64::NAN), Ordering::Greater)]
    fn nan_is_least(generic: AtomicSortComparer, #[case] a: AtomicValue, #[case] b: AtomicValue, #[case] expected: Ordering) {
        assert_eq!(cmp(&generic, &a, &b).unwrap(), expected);
        assert_eq!(cmp(&DoubleSortComparer, &a, &b).unwrap(), expected);
    }

    #[rstest]
    #[case(AtomicValue::Double(1e-30), AtomicValue::Double(0.0), Ordering::Greater)]
    #[case(AtomicValue::Double(0.1), AtomicValue::Double(f64::from_bits(0.1f64.to_bits() + 1)), Ordering::Less)]
    #[case(AtomicValue::Double(-0.0), AtomicValue::Integer(0), Ordering::Equal)]
    fn doubles_keep_full_precision(
        generic: AtomicSortComparer,
        #[case] a: AtomicValue,
        #[case] b: AtomicValue,
        #[case] expected: Ordering,
    ) {
        for c in [&generic as &dyn AtomicComparer, &DoubleSortComparer] {
            assert_eq!(cmp(c, &a, &b).unwrap(), expected);
            assert_eq!(c.comparison_key(&a).unwrap() == c.comparison_key(&b).unwrap(), expected.is_eq());
        }
    }

    #[rstest]
    fn decimal_comparer_stays_exact() {
        let a = AtomicValue::Decimal(Decimal::new(1, 1));
        let b = AtomicValue::Decimal(Decimal::from_i128_with_scale(1_000_000_000_000_000_000_001, 22));
        assert_eq!(cmp(&DecimalSortComparer, &a, &b).unwrap(), Ordering::Less);
        assert!(!DecimalSortComparer.compares_equal(&a, &b).unwrap());
        // Promoted to double, the two collapse.
        assert_eq!(cmp(&DoubleSortComparer, &a, &b).unwrap(), Ordering::Equal);
        assert_eq!(DoubleSortComparer.comparison_key(&a).unwrap(), DoubleSortComparer.comparison_key(&b).unwrap());
    }

    #[rstest]
    fn empty_sorts_first_then_last_when_greatest(generic: AtomicSortComparer) {
        let one = AtomicValue::Integer(1);
        assert_eq!(generic.compare_atomic_values(None, Some(&one)).unwrap(), Ordering::Less);
        let greatest = EmptyGreatestComparer::new(Arc::new(generic));
        assert_eq!(greatest.compare_atomic_values(None, Some(&one)).unwrap(), Ordering::Greater);
        let nan = AtomicValue::Double(f64::NAN);
        assert_eq!(greatest.compare_atomic_values(Some(&nan), Some(&one)).unwrap(), Ordering::Greater);
        assert_eq!(greatest.compare_atomic_values(Some(&nan), None).unwrap(), Ordering::Less);
    }

    #[rstest]
    fn calendar_values_use_implicit_timezone() {
        let local = AtomicValue::convert_untyped("2024-05-01T12:00:00", PrimitiveType::DateTime).unwrap();
        let utc = AtomicValue::convert_untyped("2024-05-01T10:00:00Z", PrimitiveType::DateTime).unwrap();
        let plus_two = FixedOffset::east_opt(7200).unwrap();
        let c = CalendarValueComparer::new(plus_two);
        assert_eq!(cmp(&c, &local, &utc).unwrap(), Ordering::Equal);
        assert_eq!(c.comparison_key(&local).unwrap(), c.comparison_key(&utc).unwrap());
        let utc_c = CalendarValueComparer::new(chrono::Utc.fix());
        assert_eq!(cmp(&utc_c, &local, &utc).unwrap(), Ordering::Greater);
    }

    #[rstest]
    fn dates_and_times_do_not_mix(generic: AtomicSortComparer) {
        let d = AtomicValue::convert_untyped("2024-05-01", PrimitiveType::Date).unwrap();
        let t = AtomicValue::convert_untyped("10:00:00", PrimitiveType::Time).unwrap();
        assert!(cmp(&generic, &d, &t).is_err());
    }

    #[rstest]
    fn qnames_are_equal_but_unordered(generic: AtomicSortComparer) {
        let a = AtomicValue::QName { ns_uri: Some("urn:x".into()), prefix: Some("a".into()), local: "n".into() };
        let b = AtomicValue::QName { ns_uri: Some("urn:x".into()), prefix: Some("b".into()), local: "n".into() };
        assert!(generic.compares_equal(&a, &b).unwrap());
        assert_eq!(generic.comparison_key(&a).unwrap(), generic.comparison_key(&b).unwrap());
        assert!(cmp(&generic, &a, &b).is_err());
    }

    #[rstest]
    fn durations_compare_equal_across_subtypes(generic: AtomicSortComparer) {
        let ym = AtomicValue::YearMonthDuration(12);
        let d = AtomicValue::Duration { months: 12, nanos: 0 };
        assert!(generic.compares_equal(&ym, &d).unwrap());
        assert_eq!(generic.comparison_key(&ym).unwrap(), generic.comparison_key(&d).unwrap());
        let mixed = AtomicValue::Duration { months: 1, nanos: 1 };
        assert!(cmp(&generic, &mixed, &AtomicValue::DayTimeDuration(5)).is_err());
    }

    #[rstest]
    #[case(AtomicValue::string("12"), AtomicValue::Integer(3), Ordering::Greater)]
    #[case(AtomicValue::string("abc"), AtomicValue::Integer(-100), Ordering::Less)]
    #[case(AtomicValue::string("+INF"), AtomicValue::Integer(0), Ordering::Less)]
    fn number_data_type_converts_strings(#[case] a: AtomicValue, #[case] b: AtomicValue, #[case] expected: Ordering) {
        assert_eq!(cmp(NumericComparer::instance().as_ref(), &a, &b).unwrap(), expected);
    }

    #[rstest]
    fn xsd11_numbers_accept_plus_inf() {
        let c = NumericComparer::instance_11();
        let ord = cmp(c.as_ref(), &AtomicValue::string("+INF"), &AtomicValue::Integer(0)).unwrap();
        assert_eq!(ord, Ordering::Greater);
    }

    #[rstest]
    fn text_data_type_compares_string_values() {
        let c = TextComparer::new(CodepointCollatingComparer::instance());
        assert_eq!(cmp(&c, &AtomicValue::Integer(10), &AtomicValue::Integer(9)).unwrap(), Ordering::Less);
        assert_eq!(c.comparison_key(&AtomicValue::Boolean(true)).unwrap(), ComparisonKey::StringRaw("true".into()));
    }

    #[rstest]
    fn descending_reverses_but_keeps_equality() {
        let c = DescendingComparer::new(DecimalSortComparer::instance());
        let (one, two) = (AtomicValue::Integer(1), AtomicValue::Decimal(Decimal::new(20, 1)));
        assert_eq!(cmp(&c, &one, &two).unwrap(), Ordering::Greater);
        assert!(c.compares_equal(&two, &AtomicValue::Integer(2)).unwrap());
        assert_eq!(c.describe(), "descending(decimal)");
    }

    #[rstest]
    fn uppercase_first_collation_breaks_ties() {
        let reg = CollationRegistry::new();
        let base = reg.get(SIMPLE_CASE_URI).unwrap();
        let c = CollatingAtomicComparer::new(UppercaseFirstCollation::wrap(base.clone()));
        assert_eq!(cmp(&c, &AtomicValue::string("ABC"), &AtomicValue::string("abc")).unwrap(), Ordering::Less);
        assert_eq!(
            cmp(&c, &AtomicValue::string("abc"), &AtomicValue::string("abd")).unwrap(),
            base.compare("abc", "abd")
        );
    }

    #[rstest]
    #[case(PrimitiveType::String, "codepoint")]
    #[case(PrimitiveType::UntypedAtomic, "codepoint")]
    #[case(PrimitiveType::Decimal, "decimal")]
    #[case(PrimitiveType::Float, "double")]
    #[case(PrimitiveType::Date, "calendar(+00:00)")]
    #[case(PrimitiveType::Boolean, "atomic-sort(http://www.w3.org/2005/xpath-functions/collation/codepoint)")]
    fn factory_dispatches_on_type(#[case] ty: PrimitiveType, #[case] expected: &str) {
        let ctx = DynamicContextBuilder::new().build();
        assert_eq!(make_sort_comparer(None, ty, &ctx).describe(), expected);
    }

    #[rstest]
    fn factory_uses_collation_for_strings() {
        let ctx = DynamicContextBuilder::new().build();
        let case_blind = ctx.collations().get(SIMPLE_CASE_URI);
        let c = make_sort_comparer(case_blind, PrimitiveType::String, &ctx);
        assert!(c.compares_equal(&AtomicValue::string("A"), &AtomicValue::string("a")).unwrap());
        assert_eq!(c.string_collator().map(|c| c.uri().to_string()).as_deref(), Some(SIMPLE_CASE_URI));
    }

    #[rstest]
    fn singletons_are_shared() {
        assert!(Arc::ptr_eq(&DoubleSortComparer::instance(), &DoubleSortComparer::instance()));
    }
}
