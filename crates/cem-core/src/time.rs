//! UTC timestamps for cache expiry and BOM stamping (no chrono dependency).
//!
//! Dates come from Howard Hinnant's civil_from_days algorithm.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current UTC time as Unix seconds.
pub fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Current UTC timestamp in ISO-8601 format.
pub fn now_iso8601() -> String {
    unix_to_iso8601(now_unix_secs())
}

/// Expiry instant for an entry written at `now` with a time-to-live of `ttl_secs`.
pub fn expiry_after(now: u64, ttl_secs: u64) -> u64 {
    now.saturating_add(ttl_secs)
}

/// Convert Unix seconds to an ISO-8601 UTC string.
pub fn unix_to_iso8601(secs: u64) -> String {
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;
    let (y, m, d) = civil_from_days(days);
    format!(
        "{y:04}-{m:02}-{d:02}T{:02}:{:02}:{:02}Z",
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60
    )
}

fn civil_from_days(days: i64) -> (i64, u64, u64) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = yoe as i64 + era * 400 + i64::from(m <= 2);
    (y, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_formats() {
        assert_eq!(unix_to_iso8601(0), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn test_leap_day() {
        // 2024-02-29T12:30:05Z
        assert_eq!(unix_to_iso8601(1_709_209_805), "2024-02-29T12:30:05Z");
    }

    #[test]
    fn test_expiry_saturates() {
        assert_eq!(expiry_after(100, 3600), 3700);
        assert_eq!(expiry_after(u64::MAX - 1, 10), u64::MAX);
    }
}
