use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{Instrument, Span, info, info_span, warn};
use uuid::Uuid;

const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_REQUEST_ID_LEN: usize = 128;

/// Attached to `/chat` responses so the request log can say which session was
/// served and which tools the model reached for.
#[derive(Clone, Debug)]
pub(super) struct ChatTrace {
    pub(super) session_id: String,
    pub(super) tools_used: Vec<String>,
}

/// Runs each request inside an `http_request` span carrying its request id,
/// echoes the id back, and logs one line per request.
pub(super) async fn request_observability_middleware(req: Request, next: Next) -> Response {
    let request_id = client_request_id(&req).unwrap_or_else(|| Uuid::new_v4().to_string());
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let span = info_span!(
        "http_request",
        request_id = %request_id,
        method = %req.method(),
        route = %route,
    );

    let started_at = Instant::now();
    let mut response = next.run(req).instrument(span.clone()).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }

    log_completion(&span, &response, started_at.elapsed().as_millis() as u64);
    response
}

fn log_completion(span: &Span, response: &Response, latency_ms: u64) {
    let _entered = span.enter();
    let status = response.status();
    let chat = response.extensions().get::<ChatTrace>();
    let session_id = chat.map(|trace| trace.session_id.as_str());
    let tools_used = chat.map(|trace| trace.tools_used.join(","));

    if status.is_server_error() {
        warn!(
            status = status.as_u16(),
            latency_ms,
            session_id,
            tools_used,
            "request failed"
        );
    } else {
        info!(
            status = status.as_u16(),
            latency_ms,
            session_id,
            tools_used,
            "request completed"
        );
    }
}

/// The caller's `x-request-id`, if it is short and made of safe characters.
fn client_request_id(req: &Request) -> Option<String> {
    let raw = req.headers().get(REQUEST_ID_HEADER)?.to_str().ok()?.trim();
    let acceptable = !raw.is_empty()
        && raw.len() <= MAX_REQUEST_ID_LEN
        && raw
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.'));
    acceptable.then(|| raw.to_string())
}
