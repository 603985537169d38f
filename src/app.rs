use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::{create_router, AppState};
use crate::bot::Bot;
use crate::cache::ReadingCache;
use crate::commands::CommandDispatcher;
use crate::config::Config;
use crate::fetcher::FmiFetcher;
use crate::notifier::{AlertNotifier, Subscribers};
use crate::plot::PlotRenderer;
use crate::scheduler::{self, Poller};
use crate::telegram::TelegramClient;
use crate::tracker::ThresholdTracker;

/// Application with all spawned background tasks and the status server
pub struct Application {
    pub server_handle: JoinHandle<Result<(), std::io::Error>>,
    pub poll_scheduler_handle: JoinHandle<()>,
    pub bot_handle: JoinHandle<()>,
}

impl Application {
    /// Build every component and spawn:
    /// - status API server (Axum)
    /// - observation poll scheduler
    /// - Telegram update loop
    pub async fn build(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Initializing application components");

        // Shared state, constructed once and passed to every consumer
        let tracker = Arc::new(RwLock::new(ThresholdTracker::new(config.threshold_celsius)));
        let cache = Arc::new(ReadingCache::new(config.cache_ttl(), config.cache_max_entries));
        let subscribers = Subscribers::new();

        let fetcher = FmiFetcher::new(
            config.fmi_wfs_url.clone(),
            config.fmi_place.clone(),
            config.http_timeout(),
        )?;
        let telegram = TelegramClient::new(
            config.telegram_api_url.clone(),
            config.bot_token.clone(),
            config.http_timeout(),
        );

        let notifier = AlertNotifier::new(Arc::new(telegram.clone()), subscribers.clone());
        let poller = Poller::new(fetcher.clone(), tracker.clone(), notifier);

        let dispatcher = CommandDispatcher::new(
            fetcher,
            cache,
            tracker.clone(),
            subscribers.clone(),
            PlotRenderer::default(),
        );
        let bot = Bot::new(telegram, dispatcher);

        info!("Spawning background tasks");
        let poll_scheduler_handle = {
            let interval = config.poll_interval_minutes;
            tokio::spawn(async move {
                scheduler::start_poll_scheduler(poller, interval).await;
            })
        };

        let bot_handle = tokio::spawn(async move {
            bot.run().await;
        });

        let app = create_router(AppState {
            tracker,
            subscribers,
        })
        .layer(TraceLayer::new_for_http());

        let addr = config.server_addr();
        info!("Starting status server on {}", addr);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let server_handle = tokio::spawn(async move { axum::serve(listener, app).await });

        info!("Application initialized successfully");

        Ok(Self {
            server_handle,
            poll_scheduler_handle,
            bot_handle,
        })
    }

    /// Run until the status server stops. The poll scheduler and bot loop
    /// run indefinitely in the background.
    pub async fn run_until_stopped(self) -> Result<(), Box<dyn std::error::Error>> {
        self.server_handle.await??;
        Ok(())
    }
}
