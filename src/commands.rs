use chrono::{Datelike, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument};

use crate::cache::ReadingCache;
use crate::fetch_error::FetchError;
use crate::fetcher::{validate_range, FmiFetcher, MAX_FORECAST_HOURS, MAX_HISTORY_HOURS, MIN_HOURS};
use crate::models::{Reading, SeriesKey, SeriesKind};
use crate::notifier::Subscribers;
use crate::plot::{PlotError, PlotRenderer};
use crate::tracker::ThresholdTracker;
use crate::utils::{format_clock, format_local, format_temperature};

/// Hours of history searched for the current temperature
pub const CURRENT_WINDOW_HOURS: u32 = 6;

pub const BOT_INFO: &str = "This bot tracks the temperature at Helsinki-Vantaa (EFHK). \
Use /temperature for the current temperature, /history [hours] to plot up to the last 24h \
and /forecast [hours] to plot up to the next 48h. You will get a message when it first \
reaches 20\u{00B0}C this year; /stop unsubscribes.";

const NO_DATA_REPLY: &str = "Ei tietoja saatavilla.";
const UNAVAILABLE_REPLY: &str = "Säätiedot ovat tilapäisesti poissa käytöstä, yritä hetken päästä uudelleen.";
const NOT_CROSSED_CAPTION: &str = "Oli vielä vähän liian kylmää :(";
const FORECAST_CAPTION: &str = "Onhan tönkkä jo ostettu? ;)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Help,
    Temperature,
    History(Option<String>),
    Forecast(Option<String>),
    Unknown(String),
}

impl Command {
    /// Parse `/name[@bot] [arg]`. Returns `None` for text that is not a command.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.split_whitespace();
        let head = parts.next()?.strip_prefix('/')?;
        let name = head.split('@').next().unwrap_or_default().to_lowercase();
        let arg = parts.next().map(str::to_string);

        let command = match name.as_str() {
            "start" => Command::Start,
            "stop" => Command::Stop,
            "help" => Command::Help,
            "temperature" => Command::Temperature,
            "history" => Command::History(arg),
            "forecast" | "ennuste" => Command::Forecast(arg),
            _ => Command::Unknown(name),
        };
        Some(command)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    Photo {
        png: Vec<u8>,
        filename: String,
        caption: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please send an integer argument to change the plotting range.")]
    NotANumber(String),
    #[error("Argument must be between {min} and {max}.")]
    OutOfRange { hours: i64, min: u32, max: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Plot(#[from] PlotError),
}

impl CommandError {
    /// What the user sees when a command fails
    pub fn user_message(&self) -> String {
        match self {
            CommandError::Validation(e) => e.to_string(),
            CommandError::Fetch(FetchError::InvalidRange { min, max, .. }) => {
                format!("Argument must be between {} and {}.", min, max)
            }
            CommandError::Fetch(FetchError::EmptyData(_)) | CommandError::Plot(PlotError::EmptyData) => {
                NO_DATA_REPLY.to_string()
            }
            CommandError::Fetch(_) | CommandError::Plot(_) => UNAVAILABLE_REPLY.to_string(),
        }
    }
}

/// Validate an optional hours argument, falling back to the series maximum
pub fn parse_hours(arg: Option<&str>, kind: SeriesKind) -> Result<u32, ValidationError> {
    let max = match kind {
        SeriesKind::History => MAX_HISTORY_HOURS,
        SeriesKind::Forecast => MAX_FORECAST_HOURS,
    };
    let Some(arg) = arg else {
        return Ok(max);
    };

    let hours = arg
        .parse::<i64>()
        .map_err(|_| ValidationError::NotANumber(arg.to_string()))?;

    let out_of_range = ValidationError::OutOfRange {
        hours,
        min: MIN_HOURS,
        max,
    };
    let hours = u32::try_from(hours).map_err(|_| out_of_range.clone())?;
    validate_range(kind, hours).map_err(|_| out_of_range)?;
    Ok(hours)
}

/// Routes chat commands to the cache, provider and renderer.
#[derive(Clone)]
pub struct CommandDispatcher {
    fetcher: FmiFetcher,
    cache: Arc<ReadingCache>,
    tracker: Arc<RwLock<ThresholdTracker>>,
    subscribers: Subscribers,
    renderer: PlotRenderer,
}

impl CommandDispatcher {
    pub fn new(
        fetcher: FmiFetcher,
        cache: Arc<ReadingCache>,
        tracker: Arc<RwLock<ThresholdTracker>>,
        subscribers: Subscribers,
        renderer: PlotRenderer,
    ) -> Self {
        Self {
            fetcher,
            cache,
            tracker,
            subscribers,
            renderer,
        }
    }

    /// Handle a command. Never fails: errors become user-facing replies.
    #[instrument(skip(self))]
    pub async fn dispatch(&self, chat_id: i64, command: Command) -> Reply {
        let result = match &command {
            Command::Start => Ok(self.start(chat_id).await),
            Command::Stop => Ok(self.stop(chat_id).await),
            Command::Help => Ok(Reply::Text(BOT_INFO.to_string())),
            Command::Temperature => self.temperature().await,
            Command::History(arg) => self.history(arg.as_deref()).await,
            Command::Forecast(arg) => self.forecast(arg.as_deref()).await,
            Command::Unknown(name) => {
                debug!("Unknown command /{}", name);
                Ok(Reply::Text(format!("Unknown command /{}. {}", name, BOT_INFO)))
            }
        };

        match result {
            Ok(reply) => reply,
            Err(CommandError::Validation(e)) => {
                info!("Rejected {:?}: {}", command, e);
                Reply::Text(e.to_string())
            }
            Err(e) => {
                error!("Command {:?} failed: {}", command, e);
                Reply::Text(e.user_message())
            }
        }
    }

    async fn start(&self, chat_id: i64) -> Reply {
        if self.subscribers.subscribe(chat_id).await {
            info!(chat_id, "Chat subscribed to crossing alerts");
        }
        Reply::Text(BOT_INFO.to_string())
    }

    async fn stop(&self, chat_id: i64) -> Reply {
        if self.subscribers.unsubscribe(chat_id).await {
            info!(chat_id, "Chat unsubscribed from crossing alerts");
            Reply::Text("You will no longer receive temperature alerts.".to_string())
        } else {
            Reply::Text("You were not subscribed. Use /start to subscribe.".to_string())
        }
    }

    async fn temperature(&self) -> Result<Reply, CommandError> {
        let readings = self.history_series(CURRENT_WINDOW_HOURS).await?;
        let latest = readings
            .last()
            .ok_or(FetchError::EmptyData(SeriesKind::History))?;

        Ok(Reply::Text(format!(
            "{} (at {})",
            format_temperature(latest.temperature),
            format_clock(latest.timestamp)
        )))
    }

    async fn history(&self, arg: Option<&str>) -> Result<Reply, CommandError> {
        let hours = parse_hours(arg, SeriesKind::History)?;
        let readings = self.history_series(hours).await?;
        let threshold = self.tracker.read().await.threshold();
        let title = format!("Edellinen {}h", hours);
        let png = self.renderer.render(&readings, threshold, &title)?;

        Ok(Reply::Photo {
            png,
            filename: format!("history_{}h.png", hours),
            caption: format!("{}\n{}", title, self.crossing_caption().await),
        })
    }

    async fn forecast(&self, arg: Option<&str>) -> Result<Reply, CommandError> {
        let hours = parse_hours(arg, SeriesKind::Forecast)?;
        let fetcher = &self.fetcher;
        let readings = self
            .cache
            .get_or_fetch(SeriesKey::forecast(hours), || fetcher.fetch_forecast(hours))
            .await?;
        let threshold = self.tracker.read().await.threshold();
        let title = format!("{}h Ennuste", hours);
        let png = self.renderer.render(&readings, threshold, &title)?;

        Ok(Reply::Photo {
            png,
            filename: format!("forecast_{}h.png", hours),
            caption: format!("{}\n{}", title, FORECAST_CAPTION),
        })
    }

    async fn history_series(&self, hours: u32) -> Result<Vec<Reading>, FetchError> {
        let fetcher = &self.fetcher;
        self.cache
            .get_or_fetch(SeriesKey::history(hours), || fetcher.fetch_history(hours))
            .await
    }

    async fn crossing_caption(&self) -> String {
        let state = self.tracker.read().await.state();
        match state.crossing_timestamp {
            Some(timestamp) if state.crossed && state.year == Some(Utc::now().year()) => {
                format!("Tönkkä aukesi {}", format_local(timestamp))
            }
            _ => NOT_CROSSED_CAPTION.to_string(),
        }
    }
}
