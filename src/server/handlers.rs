//! Route handlers.

use std::net::SocketAddr;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use super::AppState;
use super::sse::to_sse_response;
use crate::error::LlmError;
use crate::relay::SendMessageRequest;
use crate::types::Session;

/// JSON error body with a status derived from the error.
fn error_response(error: &LlmError) -> Response {
    let status =
        StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match error {
        LlmError::ValidationError(violations) => {
            (status, Json(json!({ "errors": violations }))).into_response()
        }
        _ => (status, Json(json!({ "error": error.user_message() }))).into_response(),
    }
}

fn session_not_found() -> Response {
    error_response(&LlmError::SessionNotFound(String::new()))
}

/// Live sessions are limited per session; everything else per caller IP.
async fn rate_limit_key(state: &AppState, session_id: Option<&str>, addr: SocketAddr) -> String {
    if let Some(id) = session_id
        && state.relay.sessions().contains(id).await
    {
        return id.to_string();
    }
    addr.ip().to_string()
}

pub async fn send_message(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Rejected malformed chat request body");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid request body" })),
            )
                .into_response();
        }
    };

    let rate_key = rate_limit_key(&state, request.session_id.as_deref(), addr).await;
    if let Err(exceeded) = state.rate_limiter.check(&rate_key) {
        let retry_after = exceeded.retry_after_secs();
        tracing::warn!(key = %rate_key, retry_after, "Chat rate limit exceeded");
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "error": "Rate limit exceeded",
                "message": "Too many chat requests. Please try again later.",
                "retryAfter": retry_after,
            })),
        )
            .into_response();
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        return response;
    }

    match state.relay.send(request).await {
        Ok(stream) => to_sse_response(stream),
        Err(error) => {
            if error.http_status() >= 500 {
                tracing::error!(error = %error, "Chat request failed");
            }
            error_response(&error)
        }
    }
}

pub async fn create_session(State(state): State<AppState>) -> Response {
    let sessions = state.relay.sessions();
    let session_id = sessions.create().await;
    match sessions.get(&session_id).await {
        Some(session) => Json(json!({
            "sessionId": session.session_id,
            "createdAt": session.created_at.timestamp_millis(),
        }))
        .into_response(),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Failed to create session" })),
        )
            .into_response(),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionView {
    #[serde(flatten)]
    session: Session,
    message_count: usize,
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    match state.relay.sessions().get(&session_id).await {
        Some(session) => {
            let message_count = session.message_count();
            Json(SessionView {
                session,
                message_count,
            })
            .into_response()
        }
        None => session_not_found(),
    }
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    if state.relay.sessions().delete(&session_id).await {
        Json(json!({ "success": true, "message": "Session deleted successfully" })).into_response()
    } else {
        session_not_found()
    }
}

pub async fn stats(State(state): State<AppState>) -> Response {
    let selector = state.relay.selector();
    let model = selector.model_info();
    Json(json!({
        "activeSessions": state.relay.sessions().count().await,
        "aiInitialized": selector.is_initialized(),
        "provider": model.provider,
        "model": model.model,
    }))
    .into_response()
}

pub async fn health() -> Response {
    Json(json!({
        "status": "healthy",
        "service": "Show My AI",
        "timestamp": Utc::now().to_rfc3339(),
    }))
    .into_response()
}
