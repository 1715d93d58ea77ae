//! Timestamp utilities

use chrono::{SecondsFormat, Utc};

/// Current UTC time as ISO-8601 with second precision (`2024-05-01T12:00:00+00:00`)
pub fn utc_now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Current time as fractional seconds since the Unix epoch
pub fn epoch_seconds() -> f64 {
    let now = Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1_000_000.0
}

/// Local wall-clock stamp used in backup file names (`20240501_120000`)
pub fn local_stamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_utc_now_iso_has_second_precision() {
        let s = utc_now_iso();
        assert!(s.ends_with("+00:00"), "unexpected suffix: {s}");
        assert!(!s.contains('.'), "should not carry fractional seconds: {s}");
    }

    #[test]
    fn test_epoch_seconds_close_to_now() {
        let secs = epoch_seconds();
        let diff = (secs - Utc::now().timestamp() as f64).abs();
        assert!(diff < 2.0);
    }

    #[test]
    fn test_local_stamp_shape() {
        let stamp = local_stamp();
        assert_eq!(stamp.len(), 15);
        assert_eq!(&stamp[8..9], "_");
        assert!(stamp.chars().filter(|c| *c != '_').all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_millis_to_duration_one_second() {
        let duration = millis_to_duration(1000);
        assert_eq!(duration, Duration::from_secs(1));
    }
}
