//! Timestamp prefixes and duration helpers.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use regex::Regex;

/// `2024-01-02T03:04:05.678Z|0x1a2b|` with every part after the seconds
/// optional, and the whole prefix optionally wrapped in brackets.
static TIMESTAMP_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\[?(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?)Z?(?:\|0x[0-9A-Fa-f]+)?\]?\|?\s?",
    )
    .expect("timestamp prefix pattern")
});

/// Origin of the synthetic timeline used when a log carries no timestamps.
pub fn synthetic_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2000, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Split an optional real timestamp off the front of a line.
///
/// Returns the parsed timestamp (if any) and the remaining text. A prefix
/// that looks like a timestamp but does not parse is left in place.
pub fn split_timestamp(line: &str) -> (Option<NaiveDateTime>, &str) {
    let Some(caps) = TIMESTAMP_PREFIX.captures(line) else {
        return (None, line);
    };
    let (Some(whole), Some(stamp)) = (caps.get(0), caps.get(1)) else {
        return (None, line);
    };
    match NaiveDateTime::parse_from_str(stamp.as_str(), "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(ts) => (Some(ts), &line[whole.end()..]),
        Err(e) => {
            tracing::debug!(error = %e, prefix = stamp.as_str(), "Unparseable timestamp prefix");
            (None, line)
        }
    }
}

/// Longest duration a single log line may report, 30 days.
pub const MAX_DURATION_SECS: f64 = 30.0 * 24.0 * 3600.0;

/// Parse a printed duration in seconds. Rejects negatives, non-finite values
/// and anything longer than [`MAX_DURATION_SECS`].
pub fn parse_seconds(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && (0.0..=MAX_DURATION_SECS).contains(v))
}

/// Parse a printed duration in milliseconds, with the same limits as
/// [`parse_seconds`].
pub fn parse_millis(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && (0.0..=MAX_DURATION_SECS * 1_000.0).contains(v))
}

/// Durations are clamped to `0..=MAX_DURATION_SECS`.
pub fn delta_from_secs(secs: f64) -> TimeDelta {
    let secs = if secs.is_finite() { secs.clamp(0.0, MAX_DURATION_SECS) } else { 0.0 };
    TimeDelta::microseconds((secs * 1_000_000.0).round() as i64)
}

pub fn delta_from_ms(ms: f64) -> TimeDelta {
    delta_from_secs(ms / 1_000.0)
}

/// `ts + delta`, saturating at the ends of the representable range.
pub fn add_delta(ts: NaiveDateTime, delta: TimeDelta) -> NaiveDateTime {
    ts.checked_add_signed(delta).unwrap_or(if delta < TimeDelta::zero() {
        NaiveDateTime::MIN
    } else {
        NaiveDateTime::MAX
    })
}

/// `ts - delta`, saturating at the ends of the representable range.
pub fn sub_delta(ts: NaiveDateTime, delta: TimeDelta) -> NaiveDateTime {
    ts.checked_sub_signed(delta).unwrap_or(if delta < TimeDelta::zero() {
        NaiveDateTime::MAX
    } else {
        NaiveDateTime::MIN
    })
}

/// Milliseconds between two timestamps, clamped at zero.
pub fn span_ms(start: NaiveDateTime, end: NaiveDateTime) -> f64 {
    let micros = (end - start).num_microseconds().unwrap_or(0);
    (micros.max(0) as f64) / 1_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").unwrap()
    }

    #[test]
    fn test_plain_line_has_no_timestamp() {
        let (stamp, rest) = split_timestamp("Start importing Assets/A.png using Guid(ab)");
        assert!(stamp.is_none());
        assert_eq!(rest, "Start importing Assets/A.png using Guid(ab)");
    }

    #[test]
    fn test_prefix_with_fraction_and_thread() {
        let (stamp, rest) = split_timestamp("2024-03-01T10:20:30.250Z|0x1f2c|Refreshing");
        assert_eq!(stamp, Some(ts("2024-03-01T10:20:30.250")));
        assert_eq!(rest, "Refreshing");
    }

    #[test]
    fn test_bracketed_prefix() {
        let (stamp, rest) = split_timestamp("[2024-03-01T10:20:30Z] Domain Reload Profiling: 10ms");
        assert_eq!(stamp, Some(ts("2024-03-01T10:20:30")));
        assert_eq!(rest, "Domain Reload Profiling: 10ms");
    }

    #[test]
    fn test_invalid_date_is_left_alone() {
        let line = "2024-13-45T99:00:00Z|boom";
        let (stamp, rest) = split_timestamp(line);
        assert!(stamp.is_none());
        assert_eq!(rest, line);
    }

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_seconds("0.500"), Some(0.5));
        assert_eq!(parse_seconds(" 12 "), Some(12.0));
        assert_eq!(parse_seconds("-1"), None);
        assert_eq!(parse_seconds("1.2.3"), None);
        assert_eq!(parse_seconds("inf"), None);
        assert_eq!(parse_seconds("99999999999999999999"), None);
        assert_eq!(parse_millis("250"), Some(250.0));
        assert_eq!(parse_millis("1e30"), None);
    }

    #[test]
    fn test_huge_durations_are_clamped() {
        assert_eq!(delta_from_secs(1e20), TimeDelta::seconds(MAX_DURATION_SECS as i64));
        assert_eq!(delta_from_ms(f64::INFINITY), TimeDelta::zero());
        assert_eq!(delta_from_secs(-3.0), TimeDelta::zero());
    }

    #[test]
    fn test_delta_arithmetic_saturates() {
        let huge = TimeDelta::MAX;
        assert_eq!(add_delta(synthetic_epoch(), huge), NaiveDateTime::MAX);
        assert_eq!(sub_delta(synthetic_epoch(), huge), NaiveDateTime::MIN);
        assert_eq!(
            add_delta(synthetic_epoch(), TimeDelta::seconds(1)),
            synthetic_epoch() + TimeDelta::seconds(1)
        );
    }

    #[test]
    fn test_span_ms_clamps_negative() {
        let a = ts("2024-03-01T10:00:01");
        let b = ts("2024-03-01T10:00:00");
        assert_eq!(span_ms(a, b), 0.0);
        assert_eq!(span_ms(b, a), 1000.0);
        assert_eq!(delta_from_secs(0.5), TimeDelta::milliseconds(500));
    }
}
