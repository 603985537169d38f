use backon::{ExponentialBuilder, Retryable};
use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::models::CrossingEvent;
use crate::telegram::{DeliveryError, MessageSink};
use crate::utils::{format_local, format_temperature};

const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);
const MAX_RETRIES: usize = 2;

/// Chats that receive crossing alerts. Process memory only.
#[derive(Debug, Clone, Default)]
pub struct Subscribers {
    chats: Arc<RwLock<BTreeSet<i64>>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the chat was not subscribed before
    pub async fn subscribe(&self, chat_id: i64) -> bool {
        self.chats.write().await.insert(chat_id)
    }

    /// Returns `true` if the chat was subscribed
    pub async fn unsubscribe(&self, chat_id: i64) -> bool {
        self.chats.write().await.remove(&chat_id)
    }

    pub async fn contains(&self, chat_id: i64) -> bool {
        self.chats.read().await.contains(&chat_id)
    }

    pub async fn list(&self) -> Vec<i64> {
        self.chats.read().await.iter().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.chats.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.chats.read().await.is_empty()
    }
}

pub fn crossing_message(event: &CrossingEvent) -> String {
    format!(
        "Tönkkä aukesi! Lämpötila {} ({})",
        format_temperature(event.temperature),
        format_local(event.timestamp)
    )
}

/// Fans crossing alerts out to every subscriber.
///
/// Each delivery is retried with exponential backoff; a chat that stays
/// unreachable is logged and skipped.
#[derive(Clone)]
pub struct AlertNotifier {
    sink: Arc<dyn MessageSink>,
    subscribers: Subscribers,
    retry_delay: Duration,
}

impl AlertNotifier {
    pub fn new(sink: Arc<dyn MessageSink>, subscribers: Subscribers) -> Self {
        Self {
            sink,
            subscribers,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Returns the number of chats the alert reached
    #[instrument(skip(self), fields(timestamp = %event.timestamp, temperature = event.temperature))]
    pub async fn notify_crossing(&self, event: &CrossingEvent) -> usize {
        let chats = self.subscribers.list().await;
        if chats.is_empty() {
            info!("Threshold crossed but nobody is subscribed");
            return 0;
        }

        let text = crossing_message(event);
        let results = join_all(chats.iter().map(|chat_id| self.deliver(*chat_id, &text))).await;

        let delivered = results.iter().filter(|r| r.is_ok()).count();
        for (chat_id, result) in chats.iter().zip(&results) {
            if let Err(e) = result {
                warn!(chat_id, error = %e, "Failed to deliver crossing alert");
            }
        }
        info!(
            "Crossing alert delivered to {}/{} subscribers",
            delivered,
            chats.len()
        );
        delivered
    }

    async fn deliver(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.retry_delay)
            .with_max_times(MAX_RETRIES);

        (|| async { self.sink.send_text(chat_id, text).await })
            .retry(backoff)
            .notify(|e: &DeliveryError, delay: Duration| {
                warn!(chat_id, error = %e, "Retrying alert delivery in {:?}", delay);
            })
            .await
    }
}
