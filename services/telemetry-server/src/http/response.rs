//! Shared HTTP error envelope helpers. Grounded on the teacher's
//! `http/response.rs` verbatim — same envelope shape, same helper names.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::fmt::Display;

use telemetry_protocol::HttpErrorEnvelope;

pub type HttpResponse = Response;

pub(crate) fn json_error(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> HttpResponse {
    (status, Json(HttpErrorEnvelope { code: code.into(), message: message.into(), details: None })).into_response()
}

pub fn internal_error(err: impl Display) -> HttpResponse {
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", err.to_string())
}

pub fn not_found(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", message)
}

pub fn bad_request(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn not_found_sets_not_found_contract() {
        let response = not_found("patient missing");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: HttpErrorEnvelope = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.code, "NOT_FOUND");
        assert_eq!(parsed.message, "patient missing");
    }
}
