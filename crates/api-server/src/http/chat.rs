use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use shared::models::{ChatRequest, ChatResponse, ChatResponseContext};
use shared::sessions::DEFAULT_SESSION_ID;
use shared::tools::ToolContext;
use tracing::error;

use super::AppState;
use super::errors::{bad_request_response, chat_failed_response};
use super::observability::ChatTrace;

pub(super) async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Response {
    let message = req.message.trim();
    if message.is_empty() {
        return bad_request_response("invalid_message", "Message must not be empty");
    }

    let session_id = req
        .session_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .unwrap_or(DEFAULT_SESSION_ID)
        .to_string();
    let context = ToolContext::from_request_context(req.context.as_ref(), state.local_now());

    let outcome = state
        .orchestrator
        .generate(message, &session_id, context)
        .await;

    let (mut response, tools_used) = match outcome {
        Ok(result) => {
            let tools_used = result.used_tools.clone();
            let body = ChatResponse {
                response: result.message,
                context: ChatResponseContext {
                    timestamp: Utc::now(),
                    session_id: session_id.clone(),
                },
                tools_used: result.used_tools,
            };
            (Json(body).into_response(), tools_used)
        }
        Err(err) => {
            error!(session_id = %session_id, "chat exchange failed: {err}");
            (chat_failed_response(), Vec::new())
        }
    };

    response.extensions_mut().insert(ChatTrace {
        session_id,
        tools_used,
    });
    response
}
