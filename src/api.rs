use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::notifier::Subscribers;
use crate::tracker::ThresholdTracker;

#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<RwLock<ThresholdTracker>>,
    pub subscribers: Subscribers,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub threshold_celsius: f64,
    pub year: Option<i32>,
    pub crossed: bool,
    pub crossing_timestamp: Option<DateTime<Utc>>,
    pub crossing_temperature: Option<f64>,
    pub subscribers: usize,
}

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}

#[instrument(skip(_state))]
async fn health(State(_state): State<AppState>) -> impl IntoResponse {
    debug!("Health check requested");
    let response = HealthResponse {
        status: "healthy".to_string(),
    };
    (StatusCode::OK, Json(response))
}

#[instrument(skip(state))]
async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let (threshold, tracked) = {
        let tracker = state.tracker.read().await;
        (tracker.threshold(), tracker.state())
    };
    let subscribers = state.subscribers.len().await;
    debug!(
        "Status requested: year={:?} crossed={} subscribers={}",
        tracked.year, tracked.crossed, subscribers
    );

    Json(StatusResponse {
        threshold_celsius: threshold,
        year: tracked.year,
        crossed: tracked.crossed,
        crossing_timestamp: tracked.crossing_timestamp,
        crossing_temperature: tracked.crossing_temperature,
        subscribers,
    })
}
