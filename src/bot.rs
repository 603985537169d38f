use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::commands::{Command, CommandDispatcher, Reply};
use crate::telegram::{DeliveryError, MessageSink, TelegramClient, Update};

pub const DEFAULT_LONG_POLL_SECS: u64 = 30;
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Telegram update loop: receives commands and delivers replies.
#[derive(Clone)]
pub struct Bot {
    client: TelegramClient,
    dispatcher: CommandDispatcher,
    long_poll_secs: u64,
}

impl Bot {
    pub fn new(client: TelegramClient, dispatcher: CommandDispatcher) -> Self {
        Self {
            client,
            dispatcher,
            long_poll_secs: DEFAULT_LONG_POLL_SECS,
        }
    }

    pub fn with_long_poll_secs(mut self, long_poll_secs: u64) -> Self {
        self.long_poll_secs = long_poll_secs;
        self
    }

    /// Acknowledge every update queued while the bot was offline without
    /// answering, so a restart does not reply to stale commands.
    ///
    /// Returns the offset to continue from.
    #[instrument(skip(self))]
    pub async fn flush_backlog(&self) -> Result<Option<i64>, DeliveryError> {
        let mut offset = None;
        loop {
            let updates = self.client.get_updates(offset, 0).await?;
            let Some(last) = updates.last() else {
                break;
            };
            info!("Flushing {} queued updates", updates.len());
            offset = Some(last.update_id + 1);
        }
        Ok(offset)
    }

    /// Dispatch one update and deliver the reply. Returns whether a reply was
    /// sent.
    #[instrument(skip(self, update), fields(update_id = update.update_id))]
    pub async fn handle_update(&self, update: &Update) -> bool {
        let Some(message) = &update.message else {
            debug!("Ignoring update without message");
            return false;
        };
        let Some(command) = message.text.as_deref().and_then(Command::parse) else {
            debug!("Ignoring non-command message");
            return false;
        };

        let chat_id = message.chat.id;
        let reply = self.dispatcher.dispatch(chat_id, command).await;

        let delivery = match reply {
            Reply::Text(text) => self.client.send_text(chat_id, &text).await,
            Reply::Photo {
                png,
                filename,
                caption,
            } => self.client.send_photo(chat_id, png, &filename, &caption).await,
        };

        match delivery {
            Ok(()) => true,
            Err(e) => {
                warn!(chat_id, error = %e, "Failed to deliver reply");
                false
            }
        }
    }

    /// Run the update loop forever
    #[instrument(skip(self), fields(long_poll_secs = self.long_poll_secs))]
    pub async fn run(&self) {
        let mut offset = match self.flush_backlog().await {
            Ok(offset) => offset,
            Err(e) => {
                warn!("Could not flush update backlog: {}", e);
                None
            }
        };
        info!("Bot update loop started");

        loop {
            match self.client.get_updates(offset, self.long_poll_secs).await {
                Ok(updates) => {
                    for update in &updates {
                        offset = Some(update.update_id + 1);
                        self.handle_update(update).await;
                    }
                }
                Err(e) => {
                    error!("Failed to fetch updates: {}", e);
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            }
        }
    }
}
