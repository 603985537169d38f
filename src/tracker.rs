use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::models::{CrossingEvent, Reading};

pub const DEFAULT_THRESHOLD_CELSIUS: f64 = 20.0;

/// Crossing state for the calendar year currently being tracked
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdState {
    /// `None` until the first reading has been observed
    pub year: Option<i32>,
    pub crossed: bool,
    pub crossing_timestamp: Option<DateTime<Utc>>,
    pub crossing_temperature: Option<f64>,
}

impl ThresholdState {
    fn for_year(year: i32) -> Self {
        Self {
            year: Some(year),
            crossed: false,
            crossing_timestamp: None,
            crossing_temperature: None,
        }
    }
}

/// Detects the first reading per calendar year (UTC) that reaches the
/// threshold.
///
/// Readings must be fed in non-decreasing timestamp order; the tracker does
/// not reorder them. A reading from a different year than the tracked one
/// resets the state before it is evaluated.
#[derive(Debug, Clone)]
pub struct ThresholdTracker {
    threshold: f64,
    state: ThresholdState,
}

impl ThresholdTracker {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            state: ThresholdState {
                year: None,
                crossed: false,
                crossing_timestamp: None,
                crossing_temperature: None,
            },
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn state(&self) -> ThresholdState {
        self.state
    }

    pub fn observe(&mut self, reading: &Reading) -> Option<CrossingEvent> {
        let year = reading.timestamp.year();
        if self.state.year != Some(year) {
            if self.state.year.is_some() {
                info!(
                    previous_year = ?self.state.year,
                    new_year = year,
                    "Calendar year changed, resetting threshold state"
                );
            }
            self.state = ThresholdState::for_year(year);
        }

        if self.state.crossed || reading.temperature < self.threshold {
            return None;
        }

        self.state.crossed = true;
        self.state.crossing_timestamp = Some(reading.timestamp);
        self.state.crossing_temperature = Some(reading.temperature);
        debug!(
            "Threshold {:.1}°C reached at {} ({:.1}°C)",
            self.threshold, reading.timestamp, reading.temperature
        );

        Some(CrossingEvent {
            timestamp: reading.timestamp,
            temperature: reading.temperature,
        })
    }
}

impl Default for ThresholdTracker {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_CELSIUS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reading(y: i32, mo: u32, d: u32, h: u32, temp: f64) -> Reading {
        Reading::new(Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap(), temp)
    }

    #[test]
    fn test_first_qualifying_reading_emits_single_event() {
        let mut tracker = ThresholdTracker::default();
        let readings = [
            reading(2024, 1, 1, 0, 5.0),
            reading(2024, 6, 10, 12, 19.9),
            reading(2024, 6, 10, 13, 20.0),
            reading(2024, 6, 10, 14, 21.0),
        ];

        let events: Vec<(usize, CrossingEvent)> = readings
            .iter()
            .enumerate()
            .filter_map(|(i, r)| tracker.observe(r).map(|e| (i, e)))
            .collect();

        assert_eq!(events.len(), 1);
        let (index, event) = events[0];
        assert_eq!(index, 2);
        assert_eq!(
            event.timestamp,
            Utc.with_ymd_and_hms(2024, 6, 10, 13, 0, 0).unwrap()
        );
        assert_eq!(event.temperature, 20.0);

        let state = tracker.state();
        assert_eq!(state.year, Some(2024));
        assert!(state.crossed);
        assert_eq!(state.crossing_timestamp, Some(event.timestamp));
    }

    #[test]
    fn test_many_qualifying_readings_in_one_year() {
        let mut tracker = ThresholdTracker::default();
        let mut emitted = 0;
        for day in 1..=30 {
            let temp = if day % 3 == 0 { 25.0 } else { 12.0 };
            if tracker.observe(&reading(2024, 7, day, 12, temp)).is_some() {
                emitted += 1;
            }
        }
        assert_eq!(emitted, 1);
        assert_eq!(
            tracker.state().crossing_timestamp,
            Some(Utc.with_ymd_and_hms(2024, 7, 3, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_below_threshold_never_crosses() {
        let mut tracker = ThresholdTracker::default();
        for h in 0..24 {
            assert!(tracker.observe(&reading(2024, 5, 1, h, 19.99)).is_none());
        }
        assert!(!tracker.state().crossed);
        assert_eq!(tracker.state().crossing_timestamp, None);
    }

    #[test]
    fn test_year_rollover_resets_crossed() {
        let mut tracker = ThresholdTracker::default();
        assert!(tracker.observe(&reading(2023, 7, 1, 12, 24.0)).is_some());
        assert!(tracker.observe(&reading(2023, 12, 31, 23, 1.0)).is_none());
        assert!(tracker.state().crossed);

        assert!(tracker.observe(&reading(2024, 1, 1, 0, -3.0)).is_none());
        let state = tracker.state();
        assert_eq!(state.year, Some(2024));
        assert!(!state.crossed);
        assert_eq!(state.crossing_timestamp, None);

        // The new year can cross again
        let event = tracker.observe(&reading(2024, 5, 20, 14, 20.5));
        assert!(event.is_some());
    }

    #[test]
    fn test_rollover_reading_itself_can_cross() {
        let mut tracker = ThresholdTracker::new(-5.0);
        assert!(tracker.observe(&reading(2023, 12, 31, 23, -2.0)).is_some());
        assert!(tracker.observe(&reading(2024, 1, 1, 0, -1.0)).is_some());
        assert_eq!(tracker.state().year, Some(2024));
    }

    #[test]
    fn test_custom_threshold() {
        let mut tracker = ThresholdTracker::new(25.0);
        assert_eq!(tracker.threshold(), 25.0);
        assert!(tracker.observe(&reading(2024, 7, 1, 12, 24.9)).is_none());
        assert!(tracker.observe(&reading(2024, 7, 1, 13, 25.0)).is_some());
    }
}
