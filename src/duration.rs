//! Duration notation used by step timeouts, retry intervals and
//! manual-intervention timeouts.
//!
//! Values are written the way pipeline definitions write them: `30s`, `10m`,
//! `1h30m`, `1d2h3m4s500ms`. Units must appear in descending order, each at
//! most once. [`format_duration`] produces the canonical form, so a value
//! survives a serialize/deserialize cycle byte-for-byte.

use std::time::Duration;

use thiserror::Error;

const MILLIS_PER_SECOND: u64 = 1_000;
const MILLIS_PER_MINUTE: u64 = 60 * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: u64 = 60 * MILLIS_PER_MINUTE;
const MILLIS_PER_DAY: u64 = 24 * MILLIS_PER_HOUR;

/// Units in descending order. The position doubles as the ordering rank.
const UNITS: [(&str, u64); 5] = [
    ("d", MILLIS_PER_DAY),
    ("h", MILLIS_PER_HOUR),
    ("m", MILLIS_PER_MINUTE),
    ("s", MILLIS_PER_SECOND),
    ("ms", 1),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationParseError {
    #[error("duration is empty")]
    Empty,

    #[error("invalid duration `{0}`: expected e.g. `30s`, `10m` or `1h30m`")]
    Invalid(String),

    #[error("duration `{0}` overflows")]
    Overflow(String),
}

/// Parses a duration such as `1h30m` or `500ms`.
pub fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DurationParseError::Empty);
    }

    let invalid = || DurationParseError::Invalid(input.to_string());
    let mut rest = trimmed;
    let mut total: u64 = 0;
    let mut last_rank: Option<usize> = None;

    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits_end == 0 {
            return Err(invalid());
        }
        let value: u64 = rest[..digits_end].parse().map_err(|_| invalid())?;
        rest = &rest[digits_end..];

        let unit_end = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        let unit = &rest[..unit_end];
        rest = &rest[unit_end..];

        let (rank, millis) = UNITS
            .iter()
            .enumerate()
            .find(|(_, (suffix, _))| *suffix == unit)
            .map(|(rank, (_, millis))| (rank, *millis))
            .ok_or_else(invalid)?;

        if last_rank.is_some_and(|last| last >= rank) {
            return Err(invalid());
        }
        last_rank = Some(rank);

        total = value
            .checked_mul(millis)
            .and_then(|part| total.checked_add(part))
            .ok_or_else(|| DurationParseError::Overflow(input.to_string()))?;
    }

    Ok(Duration::from_millis(total))
}

/// Renders a duration in canonical notation. Sub-millisecond precision is dropped.
pub fn format_duration(duration: Duration) -> String {
    let mut remaining = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    if remaining == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    for (suffix, millis) in UNITS {
        let count = remaining / millis;
        if count > 0 {
            out.push_str(&format!("{count}{suffix}"));
            remaining -= count * millis;
        }
    }
    out
}

/// `#[serde(with = "crate::duration::text")]` for a single [`Duration`].
pub mod text {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

/// `#[serde(with = "crate::duration::text_opt")]` for an optional [`Duration`].
pub mod text_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&super::format_duration(*duration)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| super::parse_duration(&raw).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// `#[serde(with = "crate::duration::text_seq")]` for a list of [`Duration`]s.
pub mod text_seq {
    use std::time::Duration;

    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[Duration], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for value in values {
            seq.serialize_element(&super::format_duration(*value))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Duration>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|raw| super::parse_duration(raw).map_err(serde::de::Error::custom))
            .collect()
    }
}
