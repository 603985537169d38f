use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::models::{Reading, SeriesKey};

pub const DEFAULT_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_ENTRIES: usize = 16;

#[derive(Debug, Clone)]
struct CacheEntry {
    readings: Vec<Reading>,
    fetched_at: Instant,
}

type Slot = Arc<Mutex<Option<CacheEntry>>>;

/// Read-through cache of provider series keyed by query parameters.
///
/// Each key owns its own async lock, held across the fetch, so concurrent
/// callers for the same key share a single in-flight request. Expiry is
/// checked lazily on access.
#[derive(Debug)]
pub struct ReadingCache {
    ttl: Duration,
    max_entries: usize,
    slots: Mutex<HashMap<SeriesKey, Slot>>,
}

impl ReadingCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached series for `key`, or run `fetch` and store its result.
    ///
    /// A failing fetch propagates its error and stores nothing.
    #[instrument(skip(self, fetch), fields(key = %key))]
    pub async fn get_or_fetch<F, Fut, E>(&self, key: SeriesKey, fetch: F) -> Result<Vec<Reading>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Reading>, E>>,
    {
        let slot = self.slot(key).await;
        let mut entry = slot.lock().await;

        if let Some(cached) = entry.as_ref() {
            if !self.is_expired(cached) {
                debug!("Cache hit ({} readings)", cached.readings.len());
                return Ok(cached.readings.clone());
            }
            debug!("Cache entry expired");
        } else {
            debug!("Cache miss");
        }

        let readings = fetch().await?;
        *entry = Some(CacheEntry {
            readings: readings.clone(),
            fetched_at: Instant::now(),
        });
        debug!("Stored {} readings", readings.len());

        Ok(readings)
    }

    /// Number of live (non-expired) entries
    pub async fn len(&self) -> usize {
        let slots = self.slots.lock().await;
        let mut live = 0;
        for slot in slots.values() {
            if let Ok(entry) = slot.try_lock() {
                if entry.as_ref().is_some_and(|e| !self.is_expired(e)) {
                    live += 1;
                }
            }
        }
        live
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn in_use(slot: &Slot) -> bool {
        Arc::strong_count(slot) > 1
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        Instant::now().duration_since(entry.fetched_at) > self.ttl
    }

    async fn slot(&self, key: SeriesKey) -> Slot {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.get(&key) {
            return slot.clone();
        }

        if slots.len() >= self.max_entries {
            self.evict(&mut slots);
        }

        let slot: Slot = Arc::new(Mutex::new(None));
        if slots.len() >= self.max_entries {
            // Every slot is in use; serve this call without caching it
            debug!(key = %key, "Cache full of in-flight entries, fetching uncached");
            return slot;
        }
        slots.insert(key, slot.clone());
        slot
    }

    /// Drop empty and expired slots, then the oldest entry if still full.
    ///
    /// A slot whose `Arc` is held outside the map belongs to a caller that is
    /// about to fetch or is fetching, and is never evicted. The map lock is
    /// held here, so no new handle can be taken while this runs.
    fn evict(&self, slots: &mut HashMap<SeriesKey, Slot>) {
        slots.retain(|key, slot| {
            if Self::in_use(slot) {
                return true;
            }
            let Ok(entry) = slot.try_lock() else {
                return true;
            };
            let keep = entry.as_ref().is_some_and(|e| !self.is_expired(e));
            if !keep {
                debug!(key = %key, "Evicting stale cache slot");
            }
            keep
        });

        if slots.len() < self.max_entries {
            return;
        }

        let oldest = slots
            .iter()
            .filter(|(_, slot)| !Self::in_use(slot))
            .filter_map(|(key, slot)| {
                let entry = slot.try_lock().ok()?;
                entry.as_ref().map(|e| (*key, e.fetched_at))
            })
            .min_by_key(|(_, fetched_at)| *fetched_at)
            .map(|(key, _)| key);

        if let Some(key) = oldest {
            debug!(key = %key, "Evicting oldest cache entry");
            slots.remove(&key);
        }
    }
}

impl Default for ReadingCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }
}
