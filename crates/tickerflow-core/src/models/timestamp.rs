use std::time::{Duration, SystemTime};

use serde::{Deserialize, Deserializer, Serializer};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub fn format_rfc3339(value: SystemTime) -> Result<String, time::error::Format> {
    OffsetDateTime::from(value).format(&Rfc3339)
}

pub fn parse_rfc3339(raw: &str) -> Result<SystemTime, time::error::Parse> {
    OffsetDateTime::parse(raw, &Rfc3339).map(SystemTime::from)
}

/// Elapsed seconds between two instants, clamped at zero when the clock
/// stepped backwards.
pub fn elapsed_seconds(from: SystemTime, to: SystemTime) -> f64 {
    to.duration_since(from)
        .unwrap_or(Duration::ZERO)
        .as_secs_f64()
}

pub(crate) mod rfc3339 {
    use super::*;

    pub fn serialize<S: Serializer>(value: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
        let formatted = format_rfc3339(*value).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&formatted)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SystemTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_rfc3339(&raw).map_err(serde::de::Error::custom)
    }
}

pub(crate) mod rfc3339_option {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<SystemTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => super::rfc3339::serialize(value, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<SystemTime>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| parse_rfc3339(&raw).map_err(serde::de::Error::custom))
            .transpose()
    }
}
