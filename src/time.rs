//! UTC timestamp rendering shared by responses, memory records and the API.

use chrono::{DateTime, Utc};

const MICROS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";
const SECONDS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Current UTC time as `YYYY-MM-DDTHH:MM:SS.ffffffZ`.
pub fn current_utc_str() -> String {
    format_utc_micros(Utc::now())
}

/// Current UTC time as `YYYY-MM-DDTHH:MM:SS`, without fractional seconds or zone suffix.
pub fn current_utc_seconds_str() -> String {
    format_utc_seconds(Utc::now())
}

pub fn format_utc_micros(instant: DateTime<Utc>) -> String {
    instant.format(MICROS_FORMAT).to_string()
}

pub fn format_utc_seconds(instant: DateTime<Utc>) -> String {
    instant.format(SECONDS_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use regex::Regex;

    #[test]
    fn micros_format_is_fixed_width() {
        let pattern = Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{6}Z$").unwrap();
        let rendered = current_utc_str();
        assert!(pattern.is_match(&rendered), "unexpected timestamp `{rendered}`");
    }

    #[test]
    fn seconds_format_has_no_fraction() {
        let pattern = Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}$").unwrap();
        let rendered = current_utc_seconds_str();
        assert!(pattern.is_match(&rendered), "unexpected timestamp `{rendered}`");
    }

    #[test]
    fn renders_known_instant() {
        let instant = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap()
            + chrono::Duration::microseconds(42);
        assert_eq!(format_utc_micros(instant), "2024-03-09T07:05:01.000042Z");
        assert_eq!(format_utc_seconds(instant), "2024-03-09T07:05:01");
    }

    #[test]
    fn sequential_calls_do_not_go_backwards() {
        let mut previous = current_utc_str();
        for _ in 0..200 {
            let next = current_utc_str();
            assert!(next >= previous, "{next} came before {previous}");
            previous = next;
        }
    }
}
