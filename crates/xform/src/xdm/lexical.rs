//! XSD lexical forms for the atomic types the comparers convert into.

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use core::fmt::Display;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Parse an `xs:double` lexical form. `INF`, `-INF` and `NaN` are accepted;
/// `+INF` only when `allow_plus_inf` (XSD 1.1 rules).
pub fn parse_xs_double(s: &str, allow_plus_inf: bool) -> Option<f64> {
    match s {
        "INF" => return Some(f64::INFINITY),
        "+INF" if allow_plus_inf => return Some(f64::INFINITY),
        "-INF" => return Some(f64::NEG_INFINITY),
        "NaN" => return Some(f64::NAN),
        _ => {}
    }
    let bytes = s.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        i += 1;
    }
    let mut mantissa_digits = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
        mantissa_digits += 1;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
            mantissa_digits += 1;
        }
    }
    if mantissa_digits == 0 {
        return None;
    }
    if i < bytes.len() && matches!(bytes[i], b'e' | b'E') {
        i += 1;
        if matches!(bytes.get(i), Some(b'+' | b'-')) {
            i += 1;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == start {
            return None;
        }
    }
    if i != bytes.len() {
        return None;
    }
    s.parse::<f64>().ok()
}

/// Parse an `xs:duration` lexical form into `(months, nanoseconds)`.
pub fn parse_xs_duration(s: &str) -> Option<(i32, i64)> {
    let (negative, rest) = match s.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, s),
    };
    let body = rest.strip_prefix('P')?;
    let (date_part, time_part) = match body.split_once('T') {
        Some((d, t)) => {
            if t.is_empty() {
                return None;
            }
            (d, Some(t))
        }
        None => (body, None),
    };
    let mut months: i64 = 0;
    let mut nanos: i64 = 0;
    let mut components = 0;

    let mut rank = 0;
    let mut cur = String::new();
    for ch in date_part.chars() {
        if ch.is_ascii_digit() {
            cur.push(ch);
            continue;
        }
        let n: i64 = cur.parse().ok()?;
        cur.clear();
        let r = match ch {
            'Y' => 1,
            'M' => 2,
            'D' => 3,
            _ => return None,
        };
        if r <= rank {
            return None;
        }
        rank = r;
        match ch {
            'Y' => months = months.checked_add(n.checked_mul(12)?)?,
            'M' => months = months.checked_add(n)?,
            _ => nanos = nanos.checked_add(n.checked_mul(86_400 * NANOS_PER_SECOND)?)?,
        }
        components += 1;
    }
    if !cur.is_empty() {
        return None;
    }
    if let Some(t) = time_part {
        let mut rank = 0;
        let mut time_components = 0;
        for ch in t.chars() {
            if ch.is_ascii_digit() || ch == '.' {
                cur.push(ch);
                continue;
            }
            let r = match ch {
                'H' => 1,
                'M' => 2,
                'S' => 3,
                _ => return None,
            };
            if r <= rank || (r != 3 && cur.contains('.')) {
                return None;
            }
            rank = r;
            let add = match ch {
                'H' => cur.parse::<i64>().ok()?.checked_mul(3_600 * NANOS_PER_SECOND)?,
                'M' => cur.parse::<i64>().ok()?.checked_mul(60 * NANOS_PER_SECOND)?,
                _ => parse_seconds(&cur)?,
            };
            cur.clear();
            nanos = nanos.checked_add(add)?;
            time_components += 1;
        }
        if !cur.is_empty() || time_components == 0 {
            return None;
        }
        components += time_components;
    }
    if components == 0 {
        return None;
    }
    let months = i32::try_from(months).ok()?;
    Some(if negative { (-months, -nanos) } else { (months, nanos) })
}

fn parse_seconds(s: &str) -> Option<i64> {
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() || (s.contains('.') && frac.is_empty()) {
        return None;
    }
    let secs: i64 = whole.parse().ok()?;
    let mut frac_nanos: i64 = 0;
    for (i, ch) in frac.chars().enumerate() {
        let d = i64::from(ch.to_digit(10)?);
        if i < 9 {
            frac_nanos += d * 10_i64.pow(8 - i as u32);
        }
    }
    secs.checked_mul(NANOS_PER_SECOND)?.checked_add(frac_nanos)
}

fn split_timezone(s: &str) -> Option<(&str, Option<FixedOffset>)> {
    if let Some(body) = s.strip_suffix('Z') {
        return Some((body, FixedOffset::east_opt(0)));
    }
    let bytes = s.as_bytes();
    let n = bytes.len();
    if n >= 6 && matches!(bytes[n - 6], b'+' | b'-') && bytes[n - 3] == b':' {
        let hours: i32 = s[n - 5..n - 3].parse().ok()?;
        let minutes: i32 = s[n - 2..].parse().ok()?;
        if hours > 14 || minutes > 59 || (hours == 14 && minutes != 0) {
            return None;
        }
        let mut secs = hours * 3600 + minutes * 60;
        if bytes[n - 6] == b'-' {
            secs = -secs;
        }
        return Some((&s[..n - 6], Some(FixedOffset::east_opt(secs)?)));
    }
    Some((s, None))
}

fn parse_date_body(s: &str) -> Option<NaiveDate> {
    let mut parts = s.splitn(3, '-');
    let year = parts.next()?;
    let month = parts.next()?;
    let day = parts.next()?;
    if year.len() < 4 || month.len() != 2 || day.len() != 2 {
        return None;
    }
    if !(year.bytes().all(|b| b.is_ascii_digit()) && month.bytes().all(|b| b.is_ascii_digit()) && day.bytes().all(|b| b.is_ascii_digit())) {
        return None;
    }
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

/// Returns the time plus a flag telling whether it was `24:00:00`.
fn parse_time_body(s: &str) -> Option<(NaiveTime, bool)> {
    let (hms, frac) = match s.split_once('.') {
        Some((h, f)) => (h, Some(f)),
        None => (s, None),
    };
    let mut parts = hms.split(':');
    let (h, m, sec) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() || h.len() != 2 || m.len() != 2 || sec.len() != 2 {
        return None;
    }
    let (h, m, sec): (u32, u32, u32) = (h.parse().ok()?, m.parse().ok()?, sec.parse().ok()?);
    let nanos = match frac {
        Some(f) if f.is_empty() || !f.bytes().all(|b| b.is_ascii_digit()) => return None,
        Some(f) => u32::try_from(parse_seconds(&format!("0.{f}"))?).ok()?,
        None => 0,
    };
    if h == 24 {
        return (m == 0 && sec == 0 && nanos == 0).then_some((NaiveTime::MIN, true));
    }
    Some((NaiveTime::from_hms_nano_opt(h, m, sec, nanos)?, false))
}

pub(crate) fn parse_date(s: &str) -> Option<(NaiveDate, Option<FixedOffset>)> {
    let (body, tz) = split_timezone(s)?;
    Some((parse_date_body(body)?, tz))
}

pub(crate) fn parse_time(s: &str) -> Option<(NaiveTime, Option<FixedOffset>)> {
    let (body, tz) = split_timezone(s)?;
    Some((parse_time_body(body)?.0, tz))
}

pub(crate) fn parse_date_time(s: &str) -> Option<(NaiveDateTime, Option<FixedOffset>)> {
    let (body, tz) = split_timezone(s)?;
    let (d, t) = body.split_once('T')?;
    let date = parse_date_body(d)?;
    let (time, end_of_day) = parse_time_body(t)?;
    let date = if end_of_day { date.succ_opt()? } else { date };
    Some((date.and_time(time), tz))
}

pub(crate) fn parse_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    s.as_bytes()
        .chunks(2)
        .map(|pair| {
            let hi = char::from(pair[0]).to_digit(16)?;
            let lo = char::from(pair[1]).to_digit(16)?;
            u8::try_from(hi * 16 + lo).ok()
        })
        .collect()
}

pub(crate) fn format_double(d: f64) -> String {
    if d.is_nan() {
        return "NaN".to_string();
    }
    if d.is_infinite() {
        return if d > 0.0 { "INF" } else { "-INF" }.to_string();
    }
    let abs = d.abs();
    if abs == 0.0 || (1e-6..1e6).contains(&abs) {
        return format!("{d}");
    }
    let sci = format!("{d:E}");
    match sci.split_once('E') {
        Some((mantissa, exp)) if !mantissa.contains('.') => format!("{mantissa}.0E{exp}"),
        _ => sci,
    }
}

pub(crate) fn format_tz(tz: Option<FixedOffset>) -> String {
    match tz {
        None => String::new(),
        Some(off) if off.local_minus_utc() == 0 => "Z".to_string(),
        Some(off) => {
            let secs = off.local_minus_utc();
            let sign = if secs < 0 { '-' } else { '+' };
            let abs = secs.abs();
            format!("{sign}{:02}:{:02}", abs / 3600, (abs % 3600) / 60)
        }
    }
}

/// Drop trailing zeros of fractional seconds from a formatted date/time.
pub(crate) fn format_naive(formatted: impl Display) -> String {
    let s = formatted.to_string();
    match s.split_once('.') {
        Some((head, frac)) => {
            let frac = frac.trim_end_matches('0');
            if frac.is_empty() { head.to_string() } else { format!("{head}.{frac}") }
        }
        None => s,
    }
}

pub(crate) fn format_duration(months: i32, nanos: i64) -> String {
    if months == 0 && nanos == 0 {
        return "PT0S".to_string();
    }
    let mut out = String::new();
    if months < 0 || nanos < 0 {
        out.push('-');
    }
    out.push('P');
    let (months, nanos) = (months.unsigned_abs(), nanos.unsigned_abs());
    let (years, months) = (months / 12, months % 12);
    if years > 0 {
        out.push_str(&format!("{years}Y"));
    }
    if months > 0 {
        out.push_str(&format!("{months}M"));
    }
    let nps = NANOS_PER_SECOND.unsigned_abs();
    let total_secs = nanos / nps;
    let frac = nanos % nps;
    let (days, rem) = (total_secs / 86_400, total_secs % 86_400);
    let (hours, rem) = (rem / 3_600, rem % 3_600);
    let (minutes, secs) = (rem / 60, rem % 60);
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }
    if hours > 0 || minutes > 0 || secs > 0 || frac > 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes > 0 {
            out.push_str(&format!("{minutes}M"));
        }
        if secs > 0 || frac > 0 {
            if frac > 0 {
                let digits = format!("{frac:09}");
                out.push_str(&format!("{secs}.{}S", digits.trim_end_matches('0')));
            } else {
                out.push_str(&format!("{secs}S"));
            }
        }
    }
    out
}
