use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Serde helpers for `time::OffsetDateTime`.
///
/// Timestamps are written and read as RFC 3339 strings
/// (e.g. `2025-01-02T03:04:05Z`).
pub mod offset_datetime {

    use super::*;

    pub fn serialize<S>(dt: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&dt.format(&Rfc3339).map_err(serde::ser::Error::custom)?)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        OffsetDateTime::parse(&raw, &Rfc3339).map_err(serde::de::Error::custom)
    }
}

/// Serde helpers for `std::time::Duration`.
///
/// Durations are written in humantime syntax (e.g. `1m 30s`), the same
/// syntax accepted by the `--timeout` flag.
pub mod duration {
    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
