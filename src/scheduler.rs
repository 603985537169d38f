use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time;
use tracing::{debug, error, info, instrument, warn};

use crate::fetch_error::FetchError;
use crate::fetcher::{FmiFetcher, MAX_HISTORY_HOURS, MIN_HOURS};
use crate::models::CrossingEvent;
use crate::notifier::AlertNotifier;
use crate::tracker::ThresholdTracker;

/// Hours of observations requested on every poll
pub const DEFAULT_POLL_WINDOW_HOURS: u32 = 3;

/// Hours of history needed to reach back past `watermark`, plus one hour of
/// overlap, and never less than `min_window`. Capped at the provider maximum.
pub fn history_window(watermark: Option<DateTime<Utc>>, now: DateTime<Utc>, min_window: u32) -> u32 {
    let min_window = min_window.clamp(MIN_HOURS, MAX_HISTORY_HOURS);
    let Some(mark) = watermark else {
        return min_window;
    };

    let behind_secs = u64::try_from((now - mark).num_seconds()).unwrap_or(0);
    let needed = behind_secs.div_ceil(3600) + 1;
    if needed > u64::from(MAX_HISTORY_HOURS) {
        warn!(
            "Last reading is {}h old, only the last {}h can be recovered",
            needed - 1,
            MAX_HISTORY_HOURS
        );
    }
    u32::try_from(needed)
        .unwrap_or(MAX_HISTORY_HOURS)
        .clamp(min_window, MAX_HISTORY_HOURS)
}

/// Feeds fresh observations to the threshold tracker and alerts subscribers
/// on a crossing.
///
/// Keeps a watermark of the newest reading already fed so that overlapping
/// poll windows only deliver new readings, in timestamp order.
pub struct Poller {
    fetcher: FmiFetcher,
    tracker: Arc<RwLock<ThresholdTracker>>,
    notifier: AlertNotifier,
    window_hours: u32,
    watermark: Option<DateTime<Utc>>,
}

impl Poller {
    pub fn new(
        fetcher: FmiFetcher,
        tracker: Arc<RwLock<ThresholdTracker>>,
        notifier: AlertNotifier,
    ) -> Self {
        Self {
            fetcher,
            tracker,
            notifier,
            window_hours: DEFAULT_POLL_WINDOW_HOURS,
            watermark: None,
        }
    }

    pub fn with_window_hours(mut self, window_hours: u32) -> Self {
        self.window_hours = window_hours;
        self
    }

    /// Resume from a known newest reading
    pub fn with_watermark(mut self, watermark: DateTime<Utc>) -> Self {
        self.watermark = Some(watermark);
        self
    }

    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.watermark
    }

    /// Run one fetch → track → notify cycle and return any crossing events.
    ///
    /// Delivery failures are logged by the notifier and never surface here.
    ///
    /// The requested window widens after missed polls so that every reading
    /// newer than the watermark is fetched again.
    #[instrument(skip(self), fields(watermark = ?self.watermark))]
    pub async fn poll_once(&mut self) -> Result<Vec<CrossingEvent>, FetchError> {
        let hours = history_window(self.watermark, Utc::now(), self.window_hours);
        debug!("Requesting the last {}h of observations", hours);
        let readings = self.fetcher.fetch_history(hours).await?;

        let fresh: Vec<_> = readings
            .into_iter()
            .filter(|r| self.watermark.map_or(true, |mark| r.timestamp > mark))
            .collect();
        debug!("{} new readings since {:?}", fresh.len(), self.watermark);

        let mut events = Vec::new();
        {
            let mut tracker = self.tracker.write().await;
            for reading in &fresh {
                if let Some(event) = tracker.observe(reading) {
                    info!(
                        "Threshold crossed at {} with {:.1}°C",
                        event.timestamp, event.temperature
                    );
                    events.push(event);
                }
            }
        }

        if let Some(last) = fresh.last() {
            self.watermark = Some(last.timestamp);
        }

        for event in &events {
            self.notifier.notify_crossing(event).await;
        }

        Ok(events)
    }
}

#[instrument(skip(poller), fields(interval_minutes = %interval_minutes))]
pub async fn start_poll_scheduler(mut poller: Poller, interval_minutes: u64) {
    let mut interval = time::interval(Duration::from_secs(interval_minutes * 60));

    info!("Poll scheduler started with {} minute interval", interval_minutes);

    loop {
        interval.tick().await;
        debug!("Scheduler tick - polling observations");

        match poller.poll_once().await {
            Ok(events) if !events.is_empty() => {
                info!("Poll produced {} crossing event(s)", events.len());
            }
            Ok(_) => {
                debug!("Poll complete, no crossing");
            }
            Err(FetchError::EmptyData(_)) => {
                warn!("Provider returned no observations this tick");
            }
            Err(e) => {
                error!("Failed to poll observations: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_window_without_watermark_is_default() {
        assert_eq!(history_window(None, now(), DEFAULT_POLL_WINDOW_HOURS), 3);
    }

    #[test]
    fn test_window_never_shrinks_below_default() {
        let mark = now() - Duration::minutes(10);
        assert_eq!(history_window(Some(mark), now(), DEFAULT_POLL_WINDOW_HOURS), 3);
    }

    #[test]
    fn test_window_reaches_back_past_old_watermark() {
        let mark = now() - Duration::hours(4) - Duration::minutes(10);
        assert_eq!(history_window(Some(mark), now(), DEFAULT_POLL_WINDOW_HOURS), 6);

        let mark = now() - Duration::hours(5);
        assert_eq!(history_window(Some(mark), now(), DEFAULT_POLL_WINDOW_HOURS), 6);
    }

    #[test]
    fn test_window_is_capped_at_history_maximum() {
        let mark = now() - Duration::days(3);
        assert_eq!(
            history_window(Some(mark), now(), DEFAULT_POLL_WINDOW_HOURS),
            MAX_HISTORY_HOURS
        );
    }

    #[test]
    fn test_window_with_future_watermark() {
        let mark = now() + Duration::minutes(5);
        assert_eq!(history_window(Some(mark), now(), DEFAULT_POLL_WINDOW_HOURS), 3);
    }
}
