//! Duration helpers shared by the state machine and the execution template.

use chrono::{DateTime, Utc};
use std::time::Duration;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const WEEK: u64 = 7 * DAY;

/// Duration between a start and a close time. `None` unless both are set.
pub fn between(start: Option<DateTime<Utc>>, close: Option<DateTime<Utc>>) -> Option<Duration> {
    let (start, close) = (start?, close?);
    (close - start).to_std().ok()
}

/// Format a duration, rounding to the most reasonable unit:
/// milliseconds below a second, seconds below an hour, minutes below a day,
/// then `<days>d<hours>h` and `<weeks>w<days>d`.
pub fn fmt_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 1 {
        let millis = (duration.as_micros() + 500) / 1000;
        if millis == 0 {
            return "0s".to_string();
        }
        if millis >= 1000 {
            return "1s".to_string();
        }
        return format!("{}ms", millis);
    }

    let rounded_secs = if duration.subsec_millis() >= 500 { secs + 1 } else { secs };
    if rounded_secs < HOUR {
        return fmt_hms(rounded_secs);
    }
    if secs < DAY {
        let minutes = (secs + 30) / MINUTE;
        return fmt_hms(minutes * MINUTE);
    }
    if secs < WEEK {
        let days = secs / DAY;
        let hours = (secs % DAY) / HOUR;
        return format!("{}d{}h", days, hours);
    }
    let weeks = secs / WEEK;
    let days = (secs % WEEK) / DAY;
    format!("{}w{}d", weeks, days)
}

fn fmt_hms(total_secs: u64) -> String {
    let hours = total_secs / HOUR;
    let minutes = (total_secs % HOUR) / MINUTE;
    let secs = total_secs % MINUTE;
    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Elapsed time for an execution: the closed duration when known,
/// otherwise the time since it started followed by "ago".
pub fn fmt_time_since(start: Option<DateTime<Utc>>, duration: Option<Duration>, now: DateTime<Utc>) -> String {
    let Some(start) = start else {
        return String::new();
    };
    match duration {
        Some(d) => fmt_duration(d),
        None => {
            let elapsed = (now - start).to_std().unwrap_or_default();
            format!("{} ago", fmt_duration(elapsed))
        }
    }
}

/// Serde adapter storing an optional duration as fractional seconds.
pub mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        let value: Option<f64> = Option::deserialize(deserializer)?;
        match value {
            Some(secs) => Duration::try_from_secs_f64(secs)
                .map(Some)
                .map_err(|e| serde::de::Error::custom(format!("invalid duration {}: {}", secs, e))),
            None => Ok(None),
        }
    }
}
