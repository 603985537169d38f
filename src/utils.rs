//! Shared formatting helpers for chat replies
//!
//! All user-visible times are shown in Helsinki local time, the station's
//! own timezone, regardless of where the bot runs.
use chrono::{DateTime, Utc};
use chrono_tz::Europe::Helsinki;

/// Format as `HH:MM` in Helsinki time
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use tonkka_bot::utils::format_clock;
///
/// let t = Utc.with_ymd_and_hms(2024, 6, 10, 13, 0, 0).unwrap();
/// assert_eq!(format_clock(t), "16:00");
/// ```
pub fn format_clock(timestamp: DateTime<Utc>) -> String {
    timestamp.with_timezone(&Helsinki).format("%H:%M").to_string()
}

/// Format as `d.m.yyyy HH:MM` in Helsinki time
pub fn format_local(timestamp: DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Helsinki)
        .format("%-d.%-m.%Y %H:%M")
        .to_string()
}

/// Format a temperature the way replies show it, e.g. `20.4°C`
pub fn format_temperature(celsius: f64) -> String {
    format!("{:.1}\u{00B0}C", celsius)
}
