//! Atomic value model consumed by the comparison engine.
//!
//! Only the parts of the XDM needed to order and group values are modelled:
//! the primitive type families that select a comparer, lexical conversion of
//! untyped atomic values, and canonical string forms used by `data-type="text"`
//! sorting.

mod lexical;

pub use lexical::{parse_xs_double, parse_xs_duration};

use crate::error::{Error, ErrorCode};
use crate::tree::Node;
use base64::Engine as _;
use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use core::fmt;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExpandedName {
    pub ns_uri: Option<String>,
    pub local: String,
}

impl ExpandedName {
    pub fn new(ns_uri: Option<String>, local: impl Into<String>) -> Self {
        Self { ns_uri, local: local.into() }
    }

    pub fn local(local: impl Into<String>) -> Self {
        Self { ns_uri: None, local: local.into() }
    }
}

impl fmt::Display for ExpandedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ns_uri {
            Some(ns) => write!(f, "Q{{{ns}}}{}", self.local),
            None => f.write_str(&self.local),
        }
    }
}

/// Coarse type category used to select a comparison strategy.
///
/// All integer-derived types collapse into [`PrimitiveType::Decimal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    AnyAtomic,
    String,
    UntypedAtomic,
    AnyUri,
    Boolean,
    Decimal,
    Double,
    Float,
    /// Statically known to be numeric, concrete type unknown.
    Numeric,
    DateTime,
    Date,
    Time,
    Duration,
    YearMonthDuration,
    DayTimeDuration,
    QName,
    Base64Binary,
    HexBinary,
}

impl PrimitiveType {
    pub fn is_string_like(self) -> bool {
        matches!(self, PrimitiveType::String | PrimitiveType::UntypedAtomic | PrimitiveType::AnyUri)
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, PrimitiveType::Decimal | PrimitiveType::Double | PrimitiveType::Float | PrimitiveType::Numeric)
    }

    pub fn is_calendar(self) -> bool {
        matches!(self, PrimitiveType::DateTime | PrimitiveType::Date | PrimitiveType::Time)
    }

    pub fn is_duration(self) -> bool {
        matches!(self, PrimitiveType::Duration | PrimitiveType::YearMonthDuration | PrimitiveType::DayTimeDuration)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            PrimitiveType::AnyAtomic => "xs:anyAtomicType",
            PrimitiveType::String => "xs:string",
            PrimitiveType::UntypedAtomic => "xs:untypedAtomic",
            PrimitiveType::AnyUri => "xs:anyURI",
            PrimitiveType::Boolean => "xs:boolean",
            PrimitiveType::Decimal => "xs:decimal",
            PrimitiveType::Double => "xs:double",
            PrimitiveType::Float => "xs:float",
            PrimitiveType::Numeric => "xs:numeric",
            PrimitiveType::DateTime => "xs:dateTime",
            PrimitiveType::Date => "xs:date",
            PrimitiveType::Time => "xs:time",
            PrimitiveType::Duration => "xs:duration",
            PrimitiveType::YearMonthDuration => "xs:yearMonthDuration",
            PrimitiveType::DayTimeDuration => "xs:dayTimeDuration",
            PrimitiveType::QName => "xs:QName",
            PrimitiveType::Base64Binary => "xs:base64Binary",
            PrimitiveType::HexBinary => "xs:hexBinary",
        }
    }
}

/// Atomic values. Numeric subtypes keep their own representation so that the
/// decimal and double comparers can work without lossy promotion.
#[derive(Debug, Clone, PartialEq)]
pub enum AtomicValue {
    Boolean(bool),
    String(String),
    UntypedAtomic(String),
    AnyUri(String),
    Integer(i64),
    Decimal(Decimal),
    Double(f64),
    Float(f32),
    DateTime {
        value: NaiveDateTime,
        tz: Option<FixedOffset>,
    },
    Date {
        date: NaiveDate,
        tz: Option<FixedOffset>,
    },
    Time {
        time: NaiveTime,
        tz: Option<FixedOffset>,
    },
    // Durations store canonical totals: months plus nanoseconds.
    Duration {
        months: i32,
        nanos: i64,
    },
    YearMonthDuration(i32),
    DayTimeDuration(i64),
    QName {
        ns_uri: Option<String>,
        prefix: Option<String>,
        local: String,
    },
    Base64Binary(Vec<u8>),
    HexBinary(Vec<u8>),
}

impl AtomicValue {
    pub fn primitive_type(&self) -> PrimitiveType {
        match self {
            AtomicValue::Boolean(_) => PrimitiveType::Boolean,
            AtomicValue::String(_) => PrimitiveType::String,
            AtomicValue::UntypedAtomic(_) => PrimitiveType::UntypedAtomic,
            AtomicValue::AnyUri(_) => PrimitiveType::AnyUri,
            AtomicValue::Integer(_) | AtomicValue::Decimal(_) => PrimitiveType::Decimal,
            AtomicValue::Double(_) => PrimitiveType::Double,
            AtomicValue::Float(_) => PrimitiveType::Float,
            AtomicValue::DateTime { .. } => PrimitiveType::DateTime,
            AtomicValue::Date { .. } => PrimitiveType::Date,
            AtomicValue::Time { .. } => PrimitiveType::Time,
            AtomicValue::Duration { .. } => PrimitiveType::Duration,
            AtomicValue::YearMonthDuration(_) => PrimitiveType::YearMonthDuration,
            AtomicValue::DayTimeDuration(_) => PrimitiveType::DayTimeDuration,
            AtomicValue::QName { .. } => PrimitiveType::QName,
            AtomicValue::Base64Binary(_) => PrimitiveType::Base64Binary,
            AtomicValue::HexBinary(_) => PrimitiveType::HexBinary,
        }
    }

    /// Display name of the most specific type, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            AtomicValue::Integer(_) => "xs:integer",
            other => other.primitive_type().display_name(),
        }
    }

    pub fn is_nan(&self) -> bool {
        match self {
            AtomicValue::Double(d) => d.is_nan(),
            AtomicValue::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.primitive_type().is_numeric()
    }

    /// Numeric value as a double; `None` for non-numeric values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AtomicValue::Integer(i) => Some(*i as f64),
            AtomicValue::Decimal(d) => Some(d.to_f64().unwrap_or(f64::NAN)),
            AtomicValue::Double(d) => Some(*d),
            AtomicValue::Float(f) => Some(f64::from(*f)),
            _ => None,
        }
    }

    /// Exact decimal value of an integer or decimal.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            AtomicValue::Integer(i) => Some(Decimal::from(*i)),
            AtomicValue::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// Convert the lexical form `text` of an untyped atomic value into a value
    /// of the `target` type. Numeric targets always yield `xs:double`.
    pub fn convert_untyped(text: &str, target: PrimitiveType) -> Result<AtomicValue, Error> {
        let invalid = || {
            Error::from_code(
                ErrorCode::FORG0001,
                format!("cannot convert untyped value '{text}' to {}", target.display_name()),
            )
        };
        let trimmed = text.trim();
        Ok(match target {
            PrimitiveType::AnyAtomic | PrimitiveType::UntypedAtomic => AtomicValue::UntypedAtomic(text.to_string()),
            PrimitiveType::String => AtomicValue::String(text.to_string()),
            PrimitiveType::AnyUri => AtomicValue::AnyUri(trimmed.to_string()),
            PrimitiveType::Boolean => match trimmed {
                "true" | "1" => AtomicValue::Boolean(true),
                "false" | "0" => AtomicValue::Boolean(false),
                _ => return Err(invalid()),
            },
            PrimitiveType::Decimal
            | PrimitiveType::Double
            | PrimitiveType::Float
            | PrimitiveType::Numeric => AtomicValue::Double(parse_xs_double(trimmed, false).ok_or_else(invalid)?),
            PrimitiveType::DateTime => {
                let (value, tz) = lexical::parse_date_time(trimmed).ok_or_else(invalid)?;
                AtomicValue::DateTime { value, tz }
            }
            PrimitiveType::Date => {
                let (date, tz) = lexical::parse_date(trimmed).ok_or_else(invalid)?;
                AtomicValue::Date { date, tz }
            }
            PrimitiveType::Time => {
                let (time, tz) = lexical::parse_time(trimmed).ok_or_else(invalid)?;
                AtomicValue::Time { time, tz }
            }
            PrimitiveType::Duration => {
                let (months, nanos) = parse_xs_duration(trimmed).ok_or_else(invalid)?;
                AtomicValue::Duration { months, nanos }
            }
            PrimitiveType::YearMonthDuration => match parse_xs_duration(trimmed) {
                Some((months, 0)) => AtomicValue::YearMonthDuration(months),
                _ => return Err(invalid()),
            },
            PrimitiveType::DayTimeDuration => match parse_xs_duration(trimmed) {
                Some((0, nanos)) => AtomicValue::DayTimeDuration(nanos),
                _ => return Err(invalid()),
            },
            PrimitiveType::Base64Binary => {
                let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
                let bytes = base64::engine::general_purpose::STANDARD.decode(compact).map_err(|e| {
                    invalid().with_source(Some(
                        std::sync::Arc::new(e) as std::sync::Arc<dyn std::error::Error + Send + Sync>
                    ))
                })?;
                AtomicValue::Base64Binary(bytes)
            }
            PrimitiveType::HexBinary => AtomicValue::HexBinary(lexical::parse_hex(trimmed).ok_or_else(invalid)?),
            // A QName needs in-scope namespaces which an untyped value does not carry.
            PrimitiveType::QName => return Err(invalid()),
        })
    }

    /// Canonical lexical representation (`fn:string`).
    pub fn string_value(&self) -> String {
        match self {
            AtomicValue::Boolean(b) => b.to_string(),
            AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) | AtomicValue::AnyUri(s) => s.clone(),
            AtomicValue::Integer(i) => i.to_string(),
            AtomicValue::Decimal(d) => d.normalize().to_string(),
            AtomicValue::Double(d) => lexical::format_double(*d),
            AtomicValue::Float(f) => lexical::format_double(f64::from(*f)),
            AtomicValue::DateTime { value, tz } => {
                format!("{}{}", lexical::format_naive(value.format("%Y-%m-%dT%H:%M:%S%.f")), lexical::format_tz(*tz))
            }
            AtomicValue::Date { date, tz } => format!("{}{}", date.format("%Y-%m-%d"), lexical::format_tz(*tz)),
            AtomicValue::Time { time, tz } => {
                format!("{}{}", lexical::format_naive(time.format("%H:%M:%S%.f")), lexical::format_tz(*tz))
            }
            AtomicValue::Duration { months, nanos } => lexical::format_duration(*months, *nanos),
            AtomicValue::YearMonthDuration(months) => lexical::format_duration(*months, 0),
            AtomicValue::DayTimeDuration(nanos) => lexical::format_duration(0, *nanos),
            AtomicValue::QName { prefix, local, .. } => match prefix {
                Some(p) if !p.is_empty() => format!("{p}:{local}"),
                _ => local.clone(),
            },
            AtomicValue::Base64Binary(bytes) => base64::engine::general_purpose::STANDARD.encode(bytes),
            AtomicValue::HexBinary(bytes) => bytes.iter().map(|b| format!("{b:02X}")).collect(),
        }
    }

    /// Months and nanoseconds of any duration subtype.
    pub fn duration_parts(&self) -> Option<(i32, i64)> {
        match self {
            AtomicValue::Duration { months, nanos } => Some((*months, *nanos)),
            AtomicValue::YearMonthDuration(m) => Some((*m, 0)),
            AtomicValue::DayTimeDuration(n) => Some((0, *n)),
            _ => None,
        }
    }

    pub fn has_timezone(&self) -> bool {
        matches!(
            self,
            AtomicValue::DateTime { tz: Some(_), .. } | AtomicValue::Date { tz: Some(_), .. } | AtomicValue::Time { tz: Some(_), .. }
        )
    }

    /// Point on the UTC time line denoted by a calendar value, using
    /// `implicit_tz` when the value carries no timezone. Times are anchored
    /// on 1972-12-31.
    pub fn to_instant(&self, implicit_tz: FixedOffset) -> Option<(i64, u32)> {
        let (local, tz) = match self {
            AtomicValue::DateTime { value, tz } => (*value, *tz),
            AtomicValue::Date { date, tz } => (date.and_time(NaiveTime::MIN), *tz),
            AtomicValue::Time { time, tz } => (NaiveDate::from_ymd_opt(1972, 12, 31)?.and_time(*time), *tz),
            _ => return None,
        };
        let offset = tz.unwrap_or(implicit_tz);
        let utc = local - chrono::Duration::seconds(i64::from(offset.local_minus_utc()));
        Some((utc.and_utc().timestamp(), utc.and_utc().timestamp_subsec_nanos()))
    }

    pub fn string(s: impl Into<String>) -> Self {
        AtomicValue::String(s.into())
    }

    pub fn untyped(s: impl Into<String>) -> Self {
        AtomicValue::UntypedAtomic(s.into())
    }
}

impl fmt::Display for AtomicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.string_value())
    }
}

impl From<bool> for AtomicValue {
    fn from(b: bool) -> Self {
        AtomicValue::Boolean(b)
    }
}

impl From<i64> for AtomicValue {
    fn from(i: i64) -> Self {
        AtomicValue::Integer(i)
    }
}

impl From<f64> for AtomicValue {
    fn from(d: f64) -> Self {
        AtomicValue::Double(d)
    }
}

impl From<Decimal> for AtomicValue {
    fn from(d: Decimal) -> Self {
        AtomicValue::Decimal(d)
    }
}

impl From<&str> for AtomicValue {
    fn from(s: &str) -> Self {
        AtomicValue::String(s.to_string())
    }
}

pub type Sequence = Vec<Item>;

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Node(Node),
    Atomic(AtomicValue),
}

impl Item {
    /// Typed value of the item. Nodes built by this crate are untyped, so
    /// their typed value is their string value as `xs:untypedAtomic`.
    pub fn atomize(&self) -> AtomicValue {
        match self {
            Item::Atomic(a) => a.clone(),
            Item::Node(n) => AtomicValue::UntypedAtomic(n.string_value()),
        }
    }

    pub fn string_value(&self) -> String {
        match self {
            Item::Atomic(a) => a.string_value(),
            Item::Node(n) => n.string_value(),
        }
    }
}

impl From<AtomicValue> for Item {
    fn from(a: AtomicValue) -> Self {
        Item::Atomic(a)
    }
}

impl From<Node> for Item {
    fn from(n: Node) -> Self {
        Item::Node(n)
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Node(n) => write!(f, "<{:?}>", n.kind()),
            Item::Atomic(a) => write!(f, "{a}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("12", PrimitiveType::Decimal, AtomicValue::Double(12.0))]
    #[case(" -INF ", PrimitiveType::Double, AtomicValue::Double(f64::NEG_INFINITY))]
    #[case("1", PrimitiveType::Boolean, AtomicValue::Boolean(true))]
    #[case("P1Y2M", PrimitiveType::YearMonthDuration, AtomicValue::YearMonthDuration(14))]
    #[case("PT1M", PrimitiveType::DayTimeDuration, AtomicValue::DayTimeDuration(60_000_000_000))]
    #[case("0aFF", PrimitiveType::HexBinary, AtomicValue::HexBinary(vec![0x0a, 0xff]))]
    fn untyped_conversions(#[case] text: &str, #[case] target: PrimitiveType, #[case] expected: AtomicValue) {
        assert_eq!(AtomicValue::convert_untyped(text, target).unwrap(), expected);
    }

    #[rstest]
    #[case("abc", PrimitiveType::Double)]
    #[case("inf", PrimitiveType::Double)]
    #[case("yes", PrimitiveType::Boolean)]
    #[case("2024-13-01", PrimitiveType::Date)]
    #[case("P1Y", PrimitiveType::DayTimeDuration)]
    #[case("a:b", PrimitiveType::QName)]
    fn invalid_untyped_conversions(#[case] text: &str, #[case] target: PrimitiveType) {
        let err = AtomicValue::convert_untyped(text, target).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::FORG0001);
    }

    #[rstest]
    fn date_parses_timezone() {
        let v = AtomicValue::convert_untyped("2024-02-29+02:00", PrimitiveType::Date).unwrap();
        assert!(v.has_timezone());
        assert_eq!(v.string_value(), "2024-02-29+02:00");
    }

    #[rstest]
    fn instants_respect_implicit_timezone() {
        let local = AtomicValue::convert_untyped("2024-01-01T10:00:00", PrimitiveType::DateTime).unwrap();
        let zoned = AtomicValue::convert_untyped("2024-01-01T08:00:00Z", PrimitiveType::DateTime).unwrap();
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(local.to_instant(plus_two), zoned.to_instant(plus_two));
    }

    #[rstest]
    #[case(AtomicValue::Double(1.0e7), "1.0E7")]
    #[case(AtomicValue::Double(0.5), "0.5")]
    #[case(AtomicValue::Double(3.0), "3")]
    #[case(AtomicValue::Double(f64::NAN), "NaN")]
    #[case(AtomicValue::Decimal(Decimal::new(2500, 2)), "25")]
    #[case(AtomicValue::DayTimeDuration(90_500_000_000), "PT1M30.5S")]
    #[case(AtomicValue::YearMonthDuration(-14), "-P1Y2M")]
    fn canonical_strings(#[case] value: AtomicValue, #[case] expected: &str) {
        assert_eq!(value.string_value(), expected);
    }
}
