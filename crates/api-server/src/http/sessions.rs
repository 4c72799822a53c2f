use axum::Json;
use axum::extract::{Path, State};
use shared::models::{AgentStatsResponse, OkResponse, SessionMemoryResponse};
use tracing::info;

use super::AppState;

pub(super) async fn reset_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<OkResponse> {
    state.orchestrator.sessions().reset(&session_id);
    info!(session_id = %session_id, "session reset");
    Json(OkResponse { ok: true })
}

pub(super) async fn session_memory(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<SessionMemoryResponse> {
    let sessions = state.orchestrator.sessions();
    let session = sessions.peek(&session_id).unwrap_or_default();

    Json(SessionMemoryResponse {
        session_id,
        history: session.history,
        recent_events: session.recent_events,
        history_limit: sessions.history_limit(),
    })
}

pub(super) async fn agent_stats(State(state): State<AppState>) -> Json<AgentStatsResponse> {
    let tools = state.orchestrator.tools();

    Json(AgentStatsResponse {
        active_sessions: state.orchestrator.sessions().active_sessions(),
        tool_count: tools.len(),
        tools: tools.tool_names().into_iter().map(str::to_string).collect(),
        provider: state.ai_provider.as_str().to_string(),
        model: state.orchestrator.model_name().to_string(),
    })
}
