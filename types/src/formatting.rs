//! Display formatting helpers.
//!
//! Durations in the event stream are carried as milliseconds (`f64`); these
//! helpers turn them, and the various counters, into compact human strings
//! for the CLI summaries.

/// Format a duration in milliseconds for display.
///
/// - Below one second: whole milliseconds
/// - Below one minute: seconds with two decimals
/// - Below one hour: `Xm SSs`
/// - Otherwise: `Xh MMm`
///
/// Negative inputs are treated as zero.
///
/// # Examples
/// ```
/// use editorlog_types::formatting::format_duration_ms;
/// assert_eq!(format_duration_ms(850.0), "850ms");
/// assert_eq!(format_duration_ms(1_500.0), "1.50s");
/// assert_eq!(format_duration_ms(125_000.0), "2m 05s");
/// assert_eq!(format_duration_ms(3_720_000.0), "1h 02m");
/// ```
pub fn format_duration_ms(ms: f64) -> String {
    let ms = if ms.is_finite() { ms.max(0.0) } else { 0.0 };
    if ms < 1_000.0 {
        format!("{:.0}ms", ms)
    } else if ms < 60_000.0 {
        format!("{:.2}s", ms / 1_000.0)
    } else if ms < 3_600_000.0 {
        let total_secs = (ms / 1_000.0).round() as u64;
        format!("{}m {:02}s", total_secs / 60, total_secs % 60)
    } else {
        let total_mins = (ms / 60_000.0).round() as u64;
        format!("{}h {:02}m", total_mins / 60, total_mins % 60)
    }
}

/// Format a byte count with binary units.
///
/// # Examples
/// ```
/// use editorlog_types::formatting::format_bytes;
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(1_536), "1.5 KiB");
/// assert_eq!(format_bytes(1_048_576), "1.0 MiB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KiB", "MiB", "GiB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Format a count with thousands separators.
///
/// # Examples
/// ```
/// use editorlog_types::formatting::format_thousands;
/// assert_eq!(format_thousands(0), "0");
/// assert_eq!(format_thousands(1_500), "1,500");
/// assert_eq!(format_thousands(1_500_000), "1,500,000");
/// ```
pub fn format_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut result = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// Format a share of a total as a percentage with one decimal.
///
/// Returns `"0%"` when the total is zero.
pub fn format_pct_ratio(part: f64, total: f64) -> String {
    if total <= 0.0 {
        return "0%".to_string();
    }
    format!("{:.1}%", part / total * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_ms_boundaries() {
        assert_eq!(format_duration_ms(0.0), "0ms");
        assert_eq!(format_duration_ms(999.0), "999ms");
        assert_eq!(format_duration_ms(1_000.0), "1.00s");
        assert_eq!(format_duration_ms(59_990.0), "59.99s");
        assert_eq!(format_duration_ms(60_000.0), "1m 00s");
        assert_eq!(format_duration_ms(3_600_000.0), "1h 00m");
    }

    #[test]
    fn test_format_duration_ms_rejects_garbage() {
        assert_eq!(format_duration_ms(-250.0), "0ms");
        assert_eq!(format_duration_ms(f64::NAN), "0ms");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1_023), "1023 B");
        assert_eq!(format_bytes(1_024), "1.0 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5.0 GiB");
    }

    #[test]
    fn test_format_thousands() {
        assert_eq!(format_thousands(7), "7");
        assert_eq!(format_thousands(999), "999");
        assert_eq!(format_thousands(1_000), "1,000");
        assert_eq!(format_thousands(12_345_678), "12,345,678");
    }

    #[test]
    fn test_format_pct_ratio() {
        assert_eq!(format_pct_ratio(3.0, 10.0), "30.0%");
        assert_eq!(format_pct_ratio(5.0, 0.0), "0%");
    }
}
