use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use shared::models::{HealthResponse, ServiceInfoResponse};
use shared::repos::bounded;
use tracing::warn;

use super::AppState;

const SERVICE_NAME: &str = "Mosque Community AI Assistant";

pub(super) async fn service_info(State(state): State<AppState>) -> Json<ServiceInfoResponse> {
    Json(ServiceInfoResponse {
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        provider: state.ai_provider.as_str().to_string(),
        model: state.orchestrator.model_name().to_string(),
        capabilities: vec![
            "function_calling".to_string(),
            "conversation_memory".to_string(),
            "prayer_times".to_string(),
            "events".to_string(),
            "volunteer_opportunities".to_string(),
            "rsvp".to_string(),
            "read_only_sql".to_string(),
        ],
    })
}

pub(super) async fn health(State(state): State<AppState>) -> Response {
    let (status, code, database) = match bounded(state.storage_timeout, state.store.ping()).await {
        Ok(()) => (StatusCode::OK, "healthy", "connected"),
        Err(err) => {
            warn!("health check failed: {err}");
            (StatusCode::SERVICE_UNAVAILABLE, "unhealthy", "unavailable")
        }
    };

    (
        status,
        Json(HealthResponse {
            status: code.to_string(),
            database: database.to_string(),
            tools: state.orchestrator.tools().len(),
            active_sessions: state.orchestrator.sessions().active_sessions(),
        }),
    )
        .into_response()
}
