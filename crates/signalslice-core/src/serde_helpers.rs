use chrono::{DateTime, NaiveTime};

/// Parse a source-clock timestamp into a time of day.
///
/// Accepts `HH:MM:SS`, `HH:MM:SS.fff` and full RFC 3339 timestamps.
pub fn parse_source_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S%.f"))
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.time()))
}

/// `#[serde(with = "source_time")]` for `NaiveTime` fields in `HH:MM:SS` form.
pub mod source_time {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(value: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format("%H:%M:%S"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_source_time(&raw)
            .ok_or_else(|| de::Error::custom(format!("unrecognised timestamp: {raw:?}")))
    }
}
