use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// A single temperature observation or forecast point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
}

impl Reading {
    pub fn new(timestamp: DateTime<Utc>, temperature: f64) -> Self {
        Self {
            timestamp,
            temperature,
        }
    }
}

/// Which provider series a cached entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesKind {
    History,
    Forecast,
}

impl fmt::Display for SeriesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeriesKind::History => write!(f, "history"),
            SeriesKind::Forecast => write!(f, "forecast"),
        }
    }
}

/// Cache key: the query parameters of a provider request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    pub kind: SeriesKind,
    pub hours: u32,
}

impl SeriesKey {
    pub fn history(hours: u32) -> Self {
        Self {
            kind: SeriesKind::History,
            hours,
        }
    }

    pub fn forecast(hours: u32) -> Self {
        Self {
            kind: SeriesKind::Forecast,
            hours,
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}h", self.kind, self.hours)
    }
}

/// Emitted once per calendar year when the threshold is first reached
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CrossingEvent {
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
}

/// Sort by timestamp and drop duplicate timestamps, keeping the value that
/// appears last in the input (the latest fetch).
pub fn sort_and_dedup(readings: Vec<Reading>) -> Vec<Reading> {
    let mut readings = readings;
    // Stable sort keeps input order among equal timestamps
    readings.sort_by_key(|r| r.timestamp);

    let mut deduped: Vec<Reading> = Vec::with_capacity(readings.len());
    for reading in readings {
        match deduped.last_mut() {
            Some(last) if last.timestamp == reading.timestamp => *last = reading,
            _ => deduped.push(reading),
        }
    }
    deduped
}
