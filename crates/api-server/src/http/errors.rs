use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use shared::models::{ErrorBody, ErrorResponse};
use shared::repos::StoreError;
use tracing::error;

pub(super) const CHAT_APOLOGY: &str = "I apologize, I'm having trouble processing your request \
                                       right now. Please try again or contact the mosque \
                                       administration for assistance.";

pub(super) fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: message.to_string(),
            },
        }),
    )
        .into_response()
}

pub(super) fn bad_request_response(code: &str, message: &str) -> Response {
    error_response(StatusCode::BAD_REQUEST, code, message)
}

pub(super) fn bad_gateway_response(code: &str, message: &str) -> Response {
    error_response(StatusCode::BAD_GATEWAY, code, message)
}

pub(super) fn chat_failed_response() -> Response {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "chat_failed", CHAT_APOLOGY)
}

pub(super) fn store_error_response(operation: &str, err: StoreError) -> Response {
    error!(operation, "database operation failed: {err}");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "Unexpected server error",
    )
}
