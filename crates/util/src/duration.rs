//! Human-friendly duration strings used by wait settings and CLI flags.
//!
//! Accepted forms: `"500ms"`, `"5s"`, `"10m"`, `"1h"`, or a bare number of
//! seconds (`"30"`). Units are case-insensitive.

use std::time::Duration;

use thiserror::Error;

/// Error returned when a duration string cannot be parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid duration '{input}': expected a number with an optional ms, s, m or h suffix")]
pub struct DurationParseError {
    input: String,
}

impl DurationParseError {
    fn new(input: &str) -> Self {
        Self { input: input.to_string() }
    }
}

/// Parse a duration string such as `"5s"` or `"10m"`.
pub fn parse_duration(raw: &str) -> Result<Duration, DurationParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DurationParseError::new(raw));
    }

    let split_at = trimmed
        .find(|character: char| !character.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split_at);
    let value: u64 = number.parse().map_err(|_| DurationParseError::new(raw))?;

    let duration = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "s" => Duration::from_secs(value),
        "ms" => Duration::from_millis(value),
        "m" => Duration::from_secs(value.checked_mul(60).ok_or_else(|| DurationParseError::new(raw))?),
        "h" => Duration::from_secs(value.checked_mul(3600).ok_or_else(|| DurationParseError::new(raw))?),
        _ => return Err(DurationParseError::new(raw)),
    };
    Ok(duration)
}

/// Format a duration using the largest unit that represents it exactly.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 != 0 {
        return format!("{millis}ms");
    }
    let seconds = duration.as_secs();
    if seconds != 0 && seconds % 3600 == 0 {
        format!("{}h", seconds / 3600)
    } else if seconds != 0 && seconds % 60 == 0 {
        format!("{}m", seconds / 60)
    } else {
        format!("{seconds}s")
    }
}

/// Serde adapter storing durations as strings (`"5s"`) while also accepting
/// integer seconds on input.
pub mod serde_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDuration {
        Text(String),
        Seconds(u64),
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match RawDuration::deserialize(deserializer)? {
            RawDuration::Text(text) => super::parse_duration(&text).map_err(de::Error::custom),
            RawDuration::Seconds(seconds) => Ok(Duration::from_secs(seconds)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[test]
    fn parses_supported_units() {
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("5s"), Ok(Duration::from_secs(5)));
        assert_eq!(parse_duration("10M"), Ok(Duration::from_secs(600)));
        assert_eq!(parse_duration(" 1h "), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_duration("30"), Ok(Duration::from_secs(30)));
    }

    #[test]
    fn rejects_malformed_input() {
        for raw in ["", "s", "5x", "-5s", "1.5s", "ten minutes"] {
            assert!(parse_duration(raw).is_err(), "expected '{raw}' to be rejected");
        }
        let error = parse_duration("5d").expect_err("days are not supported");
        assert!(error.to_string().contains("'5d'"));
    }

    #[test]
    fn formats_with_largest_exact_unit() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::from_secs(600)), "10m");
        assert_eq!(format_duration(Duration::from_secs(7200)), "2h");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Holder {
        #[serde(with = "serde_duration")]
        every: Duration,
    }

    #[test]
    fn serde_adapter_accepts_strings_and_seconds() {
        let from_text: Holder = serde_yaml::from_str("every: 2m").expect("text duration");
        assert_eq!(from_text.every, Duration::from_secs(120));

        let from_number: Holder = serde_yaml::from_str("every: 15").expect("numeric duration");
        assert_eq!(from_number.every, Duration::from_secs(15));

        let encoded = serde_json::to_string(&from_text).expect("serialize");
        assert_eq!(encoded, r#"{"every":"2m"}"#);
    }
}
