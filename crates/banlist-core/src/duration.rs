//! Device-style duration strings
//!
//! Decision durations and device timeouts use Go-style duration strings
//! (`"3h59m58.5s"`) extended with day, week and year units (`"10d"`,
//! `"2w"`, `"1y"`). A day is 24h, a week 168h and a year 8760h.

use std::sync::LazyLock;

use chrono::TimeDelta;
use regex::Regex;
use tracing::warn;

use crate::error::{Error, Result};

const NANOS_PER_SECOND: i128 = 1_000_000_000;

/// One number followed by its (possibly empty) unit suffix.
static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d*\.\d+|\d+)([^\d.]*)").expect("invalid duration token pattern")
});

/// Nanoseconds per unit, or `None` when the suffix is not a duration unit.
fn unit_nanos(unit: &str) -> Option<i128> {
    let nanos = match unit {
        "ns" => 1,
        "us" | "µs" | "μs" => 1_000,
        "ms" => 1_000_000,
        "s" => NANOS_PER_SECOND,
        "m" => 60 * NANOS_PER_SECOND,
        "h" => 3_600 * NANOS_PER_SECOND,
        "d" => 24 * 3_600 * NANOS_PER_SECOND,
        "w" => 7 * 24 * 3_600 * NANOS_PER_SECOND,
        "y" => 365 * 24 * 3_600 * NANOS_PER_SECOND,
        _ => return None,
    };
    Some(nanos)
}

/// Parse a device-style duration string.
///
/// Accepts an optional leading `-`, then any chain of `<number><unit>`
/// components which are summed. The empty string is a zero duration.
///
/// # Errors
///
/// Returns [`Error::InvalidDuration`] when a component has an unknown or
/// missing unit, when characters outside components are present, or when the
/// total does not fit in a [`TimeDelta`].
///
/// # Example
///
/// ```
/// use banlist_core::duration::parse_duration;
/// use chrono::TimeDelta;
///
/// assert_eq!(parse_duration("10d").unwrap(), TimeDelta::hours(240));
/// assert_eq!(parse_duration("1h30m").unwrap(), TimeDelta::minutes(90));
/// ```
pub fn parse_duration(input: &str) -> Result<TimeDelta> {
    let (negative, body) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input),
    };

    let mut total: i128 = 0;
    let mut consumed = 0;

    for caps in TOKEN.captures_iter(body) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        if whole.start != consumed {
            return Err(Error::invalid_duration(input));
        }
        consumed = whole.end;

        let number = &caps[1];
        let unit = &caps[2];
        let nanos = component_nanos(number, unit).ok_or_else(|| Error::invalid_duration(input))?;
        total = total
            .checked_add(nanos)
            .ok_or_else(|| Error::invalid_duration(input))?;
    }

    if consumed != body.len() {
        return Err(Error::invalid_duration(input));
    }

    if negative {
        total = -total;
    }

    let nanos = i64::try_from(total).map_err(|_| Error::invalid_duration(input))?;
    Ok(TimeDelta::nanoseconds(nanos))
}

/// Nanoseconds of one `<number><unit>` component.
fn component_nanos(number: &str, unit: &str) -> Option<i128> {
    let (int_part, frac_part) = match number.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part),
        None => (number, ""),
    };

    let int_value: i128 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().ok()?
    };
    // Digits past nanosecond precision of any unit cannot change the result.
    let frac_digits = &frac_part[..frac_part.len().min(18)];
    let frac_value: i128 = if frac_digits.is_empty() {
        0
    } else {
        frac_digits.parse().ok()?
    };

    if unit.is_empty() {
        // A bare number is only meaningful when it is zero.
        return (int_value == 0 && frac_value == 0).then_some(0);
    }

    let scale = unit_nanos(unit)?;
    let frac_nanos = frac_value * scale / 10_i128.pow(frac_digits.len() as u32);
    int_value.checked_mul(scale)?.checked_add(frac_nanos)
}

/// Parse a decision TTL, falling back to `default` when it is malformed.
pub fn parse_or_default(input: &str, default: TimeDelta) -> TimeDelta {
    match parse_duration(input) {
        Ok(ttl) => ttl,
        Err(e) => {
            warn!(
                input = %input,
                effective = %format_delta(default),
                error = %e,
                "Failed to parse decision duration, using default TTL"
            );
            default
        }
    }
}

/// Format a duration with week/day/hour/minute/second components.
///
/// Sub-second precision is dropped and zero components are omitted; the
/// zero duration is `"0s"`. The output is accepted by [`parse_duration`].
pub fn format_duration(duration: std::time::Duration) -> String {
    let mut secs = duration.as_secs();
    if secs == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    for (suffix, unit) in [("w", 604_800), ("d", 86_400), ("h", 3_600), ("m", 60), ("s", 1)] {
        let count = secs / unit;
        if count > 0 {
            out.push_str(&count.to_string());
            out.push_str(suffix);
            secs %= unit;
        }
    }
    out
}

/// Format a signed duration for logs.
pub fn format_delta(delta: TimeDelta) -> String {
    match delta.to_std() {
        Ok(d) => format_duration(d),
        Err(_) => format!("-{}", format_duration(delta.abs().to_std().unwrap_or_default())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_standard_units() {
        assert_eq!(parse_duration("4h").unwrap(), TimeDelta::hours(4));
        assert_eq!(parse_duration("10m").unwrap(), TimeDelta::minutes(10));
        assert_eq!(parse_duration("1h30m").unwrap(), TimeDelta::minutes(90));
        assert_eq!(parse_duration("250ms").unwrap(), TimeDelta::milliseconds(250));
        assert_eq!(parse_duration("7us").unwrap(), TimeDelta::microseconds(7));
        assert_eq!(parse_duration("7µs").unwrap(), TimeDelta::microseconds(7));
        assert_eq!(parse_duration("12ns").unwrap(), TimeDelta::nanoseconds(12));
    }

    #[test]
    fn test_extended_units() {
        assert_eq!(parse_duration("10d").unwrap(), TimeDelta::hours(240));
        assert_eq!(parse_duration("2w").unwrap(), TimeDelta::hours(336));
        assert_eq!(parse_duration("1y").unwrap(), TimeDelta::hours(8760));
    }

    #[test]
    fn test_composite_chain() {
        let expected = TimeDelta::hours(3 * 8760) + TimeDelta::minutes(4) + TimeDelta::hours(5 * 24);
        assert_eq!(parse_duration("3y4m5d").unwrap(), expected);
    }

    #[test]
    fn test_decimal_components() {
        assert_eq!(parse_duration("1.5h").unwrap(), TimeDelta::minutes(90));
        assert_eq!(parse_duration(".5s").unwrap(), TimeDelta::milliseconds(500));
        assert_eq!(parse_duration("0.5d").unwrap(), TimeDelta::hours(12));

        let lapi = parse_duration("3h59m58.123456789s").unwrap();
        let expected = TimeDelta::hours(3)
            + TimeDelta::minutes(59)
            + TimeDelta::seconds(58)
            + TimeDelta::nanoseconds(123_456_789);
        assert_eq!(lapi, expected);
    }

    #[test]
    fn test_negative_and_zero() {
        assert_eq!(parse_duration("-1h").unwrap(), TimeDelta::hours(-1));
        assert_eq!(parse_duration("-2d3h").unwrap(), -TimeDelta::hours(51));
        assert_eq!(parse_duration("").unwrap(), TimeDelta::zero());
        assert_eq!(parse_duration("0").unwrap(), TimeDelta::zero());
    }

    #[test]
    fn test_invalid_formats() {
        for input in ["5", "4mo", "abc", "1h x", "1x", "h1", "1.2.3s", "--1h"] {
            let result = parse_duration(input);
            assert!(
                matches!(result, Err(Error::InvalidDuration(_))),
                "expected InvalidDuration for {:?}, got {:?}",
                input,
                result
            );
        }
    }

    #[test]
    fn test_overflow_is_invalid() {
        assert!(parse_duration("99999999y").is_err());
    }

    #[test]
    fn test_parse_or_default() {
        let default = TimeDelta::hours(3);
        assert_eq!(parse_or_default("garbage", default), default);
        assert_eq!(parse_or_default("1h", default), TimeDelta::hours(1));
        assert_eq!(parse_or_default("", default), TimeDelta::zero());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(Duration::from_secs(4 * 3600)), "4h");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_duration(Duration::from_secs(240 * 3600)), "1w3d");
        assert_eq!(format_duration(Duration::from_millis(1_500)), "1s");
    }

    #[test]
    fn test_format_parse_round_trip() {
        for secs in [1, 59, 3_600, 86_399, 240 * 3_600, 336 * 3_600, 8_760 * 3_600, 1_234_567] {
            let original = Duration::from_secs(secs);
            let parsed = parse_duration(&format_duration(original)).unwrap();
            assert_eq!(parsed.to_std().unwrap(), original, "round trip of {}s", secs);
        }
    }

    #[test]
    fn test_format_delta_negative() {
        assert_eq!(format_delta(TimeDelta::hours(-2)), "-2h");
        assert_eq!(format_delta(TimeDelta::minutes(5)), "5m");
    }
}
