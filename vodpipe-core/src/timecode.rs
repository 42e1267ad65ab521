use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, Offset, TimeZone, Utc};
use thiserror::Error;

const LOCAL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("invalid duration {input:?}: bad component {component:?}")]
    Duration { input: String, component: String },
    #[error("invalid clock time {0:?}, expected HH:MM:SS")]
    ClockTime(String),
    #[error("invalid timestamp {input:?}: {reason}")]
    Timestamp { input: String, reason: String },
    #[error("utc offset of {0} minutes is out of range")]
    Offset(i32),
}

/// Parses platform durations such as `1d9h8m7s`, `3h2m` or `45s` into whole
/// seconds. Components must appear in day, hour, minute, second order.
pub fn parse_clock_duration(input: &str) -> Result<u64, FormatError> {
    let mut rest = input.trim();
    let mut total = 0f64;
    for (unit, factor) in [('d', 86_400f64), ('h', 3_600f64), ('m', 60f64), ('s', 1f64)] {
        let Some((amount, tail)) = rest.split_once(unit) else {
            continue;
        };
        let value = amount
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite() && *value >= 0.0)
            .ok_or_else(|| FormatError::Duration {
                input: input.to_string(),
                component: format!("{amount}{unit}"),
            })?;
        total += value * factor;
        rest = tail;
    }
    if !rest.trim().is_empty() {
        return Err(FormatError::Duration {
            input: input.to_string(),
            component: rest.to_string(),
        });
    }
    Ok(total as u64)
}

/// Converts an `HH:MM:SS` string into seconds.
pub fn parse_clock_time(input: &str) -> Result<u64, FormatError> {
    let invalid = || FormatError::ClockTime(input.to_string());
    let parts = input
        .trim()
        .split(':')
        .map(|part| {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse::<u64>().map_err(|_| invalid())
        })
        .collect::<Result<Vec<_>, _>>()?;
    match parts.as_slice() {
        [hours, minutes, seconds] if *hours < 24 && *minutes < 60 && *seconds < 60 => {
            Ok(hours * 3_600 + minutes * 60 + seconds)
        }
        _ => Err(invalid()),
    }
}

/// Formats seconds back into the `HH:MM:SS` form accepted by segmenters.
pub fn format_clock_time(seconds: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3_600,
        (seconds % 3_600) / 60,
        seconds % 60
    )
}

/// Parses a platform `created_at` value into unix seconds. Values without an
/// explicit offset are read as UTC.
pub fn parse_timestamp(input: &str) -> Result<i64, FormatError> {
    let trimmed = input.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.timestamp());
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S")
        .map(|naive| Utc.from_utc_datetime(&naive).timestamp())
        .map_err(|err| FormatError::Timestamp {
            input: input.to_string(),
            reason: err.to_string(),
        })
}

/// Calendar convention used to turn timestamps into date keys and to read
/// wall-clock configuration values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DateConvention {
    #[default]
    SystemLocal,
    Fixed(FixedOffset),
}

impl DateConvention {
    pub fn utc() -> Self {
        DateConvention::Fixed(Utc.fix())
    }

    pub fn from_offset_minutes(minutes: Option<i32>) -> Result<Self, FormatError> {
        match minutes {
            None => Ok(DateConvention::SystemLocal),
            Some(value) => value
                .checked_mul(60)
                .and_then(FixedOffset::east_opt)
                .map(DateConvention::Fixed)
                .ok_or(FormatError::Offset(value)),
        }
    }

    /// `YYYY-MM-DD` key of the calendar day `unix_seconds` falls on.
    pub fn date_key(&self, unix_seconds: i64) -> Result<String, FormatError> {
        let instant = Utc
            .timestamp_opt(unix_seconds, 0)
            .single()
            .ok_or_else(|| FormatError::Timestamp {
                input: unix_seconds.to_string(),
                reason: "out of range".to_string(),
            })?;
        let key = match self {
            DateConvention::SystemLocal => instant
                .with_timezone(&Local)
                .format(DATE_KEY_FORMAT)
                .to_string(),
            DateConvention::Fixed(offset) => instant
                .with_timezone(offset)
                .format(DATE_KEY_FORMAT)
                .to_string(),
        };
        Ok(key)
    }

    /// Reads a `YYYY-MM-DD HH:MM:SS` wall-clock value into unix seconds.
    pub fn parse_local_datetime(&self, input: &str) -> Result<i64, FormatError> {
        let naive = NaiveDateTime::parse_from_str(input.trim(), LOCAL_DATETIME_FORMAT).map_err(
            |err| FormatError::Timestamp {
                input: input.to_string(),
                reason: err.to_string(),
            },
        )?;
        let resolved = match self {
            DateConvention::SystemLocal => Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.timestamp()),
            DateConvention::Fixed(offset) => offset
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.timestamp()),
        };
        resolved.ok_or_else(|| FormatError::Timestamp {
            input: input.to_string(),
            reason: "does not exist in the configured timezone".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_and_partial_durations() {
        assert_eq!(parse_clock_duration("1d9h8m7s").unwrap(), 86_400 + 9 * 3_600 + 8 * 60 + 7);
        assert_eq!(parse_clock_duration("3h2m").unwrap(), 3 * 3_600 + 2 * 60);
        assert_eq!(parse_clock_duration("45s").unwrap(), 45);
        assert_eq!(parse_clock_duration("2d").unwrap(), 172_800);
        assert_eq!(parse_clock_duration("").unwrap(), 0);
        assert_eq!(parse_clock_duration("1.5m").unwrap(), 90);
    }

    #[test]
    fn rejects_malformed_durations() {
        assert!(matches!(
            parse_clock_duration("xh3m"),
            Err(FormatError::Duration { .. })
        ));
        assert!(parse_clock_duration("-1h").is_err());
        assert!(parse_clock_duration("12").is_err());
        assert!(parse_clock_duration("3m2h").is_err());
    }

    #[test]
    fn clock_time_round_trips() {
        assert_eq!(parse_clock_time("11:59:57").unwrap(), 43_197);
        assert_eq!(parse_clock_time("00:00:05").unwrap(), 5);
        assert_eq!(parse_clock_time("1:2:3").unwrap(), 3_723);
        assert_eq!(format_clock_time(43_197), "11:59:57");
        assert_eq!(format_clock_time(5), "00:00:05");
    }

    #[test]
    fn clock_time_rejects_out_of_range() {
        for input in ["24:00:00", "10:60:00", "10:00:60", "10:00", "a:b:c", "", "1:2:3:4"] {
            assert_eq!(
                parse_clock_time(input),
                Err(FormatError::ClockTime(input.to_string())),
                "{input}"
            );
        }
    }

    #[test]
    fn timestamps_are_utc_normalized() {
        assert_eq!(parse_timestamp("2024-03-01T22:15:00Z").unwrap(), 1_709_331_300);
        assert_eq!(parse_timestamp("2024-03-01T22:15:00").unwrap(), 1_709_331_300);
        assert_eq!(
            parse_timestamp("2024-03-01T23:15:00+01:00").unwrap(),
            1_709_331_300
        );
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn date_key_follows_offset() {
        let ts = parse_timestamp("2024-03-01T22:15:00Z").unwrap();
        assert_eq!(DateConvention::utc().date_key(ts).unwrap(), "2024-03-01");
        let toronto = DateConvention::from_offset_minutes(Some(-300)).unwrap();
        assert_eq!(toronto.date_key(ts).unwrap(), "2024-03-01");
        let tokyo = DateConvention::from_offset_minutes(Some(540)).unwrap();
        assert_eq!(tokyo.date_key(ts).unwrap(), "2024-03-02");
    }

    #[test]
    fn local_datetime_uses_convention() {
        let utc = DateConvention::utc();
        assert_eq!(
            utc.parse_local_datetime("2024-03-01 22:15:00").unwrap(),
            1_709_331_300
        );
        let plus_two = DateConvention::from_offset_minutes(Some(120)).unwrap();
        assert_eq!(
            plus_two.parse_local_datetime("2024-03-02 00:15:00").unwrap(),
            1_709_331_300
        );
        assert!(utc.parse_local_datetime("2024-03-01").is_err());
        assert_eq!(
            DateConvention::from_offset_minutes(Some(100_000)),
            Err(FormatError::Offset(100_000))
        );
    }
}
