use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderValue, Method, header};
use axum::routing::{get, post};
use axum::{Router, middleware};
use chrono::{NaiveDateTime, Utc};
use shared::chat::ChatOrchestrator;
use shared::config::AiProvider;
use shared::prayer_times::PrayerTimesProvider;
use shared::repos::Store;
use shared::timezone::local_now;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

mod chat;
mod directory;
mod errors;
mod health;
mod observability;
mod sessions;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub orchestrator: ChatOrchestrator,
    pub prayer_times: Arc<dyn PrayerTimesProvider>,
    pub ai_provider: AiProvider,
    pub organization_time_zone: String,
    /// Upper bound for every store call made by a handler.
    pub storage_timeout: Duration,
}

impl AppState {
    /// Current wall-clock time in the organisation's time zone.
    fn local_now(&self) -> NaiveDateTime {
        local_now(Utc::now(), &self.organization_time_zone)
    }
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(health::service_info))
        .route("/health", get(health::health))
        .route("/chat", post(chat::chat))
        .route("/prayer-times", get(directory::prayer_times))
        .route("/events", get(directory::events))
        .route(
            "/volunteer-opportunities",
            get(directory::volunteer_opportunities),
        )
        .route("/sessions/{session_id}/reset", post(sessions::reset_session))
        .route("/agent/memory/{session_id}", get(sessions::session_memory))
        .route("/agent/stats", get(sessions::agent_stats))
        .layer(middleware::from_fn(
            observability::request_observability_middleware,
        ))
        .with_state(app_state)
}

/// CORS for the configured browser origins. Origins that are not valid header
/// values are skipped with a warning.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
