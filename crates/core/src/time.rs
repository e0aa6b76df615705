//! Server timestamps are naive UTC; everything here stays in that frame.

use chrono::{DateTime, NaiveDateTime};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

const MINUTE: f64 = 60.0;
const HOUR: f64 = 3600.0;
const DAY: f64 = 86400.0;

/// Parses the timestamp shapes the server is known to emit.
pub fn parse_naive_utc(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|d| d.naive_utc()))
        .or_else(|| DateTime::parse_from_rfc2822(raw).ok().map(|d| d.naive_utc()))
}

pub fn display_timestamp(ts: Option<NaiveDateTime>) -> String {
    ts.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

/// Whole seconds between creation and last modification, rounded. Clock
/// skew that puts the modification first reads as zero.
pub fn elapsed_seconds(start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Option<i64> {
    let (start, end) = (start?, end?);
    let millis = (end - start).num_milliseconds().max(0);
    Some((millis as f64 / 1000.0).round() as i64)
}

/// Formats a duration in the largest unit it reaches at least once,
/// with one decimal place.
pub fn format_runtime(seconds: i64) -> String {
    let s = seconds as f64;
    if s >= DAY {
        format!("{:.1}d", s / DAY)
    } else if s >= HOUR {
        format!("{:.1}h", s / HOUR)
    } else if s >= MINUTE {
        format!("{:.1}min", s / MINUTE)
    } else {
        format!("{s:.1}s")
    }
}

pub(crate) mod opt_naive_utc {
    use chrono::NaiveDateTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    const WIRE: &str = "%Y-%m-%d %H:%M:%S%.f";

    pub fn serialize<S: Serializer>(
        value: &Option<NaiveDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_str(&ts.format(WIRE).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => super::parse_naive_utc(&raw)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("unrecognized timestamp {raw:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_server_shapes() {
        assert!(parse_naive_utc("2024-03-01 10:00:00").is_some());
        assert!(parse_naive_utc("2024-03-01 10:00:00.123456").is_some());
        assert!(parse_naive_utc("2024-03-01T10:00:00").is_some());
        assert!(parse_naive_utc("Fri, 01 Mar 2024 10:00:00 GMT").is_some());
        assert!(parse_naive_utc("yesterday").is_none());
    }

    #[test]
    fn runtime_units() {
        assert_eq!(format_runtime(42), "42.0s");
        assert_eq!(format_runtime(90), "1.5min");
        assert_eq!(format_runtime(3600), "1.0h");
        assert_eq!(format_runtime(90_000), "1.0d");
    }

    #[test]
    fn elapsed_rounds_to_seconds() {
        let a = parse_naive_utc("2024-03-01 10:00:00").unwrap();
        let b = parse_naive_utc("2024-03-01 10:01:30.600").unwrap();
        assert_eq!(elapsed_seconds(Some(a), Some(b)), Some(91));
        assert_eq!(elapsed_seconds(None, Some(b)), None);
    }

    #[test]
    fn skewed_clocks_never_go_negative() {
        let created = parse_naive_utc("2024-03-01 10:00:05").unwrap();
        let modified = parse_naive_utc("2024-03-01 10:00:00").unwrap();
        let secs = elapsed_seconds(Some(created), Some(modified)).unwrap();
        assert_eq!(secs, 0);
        assert_eq!(format_runtime(secs), "0.0s");
    }
}
