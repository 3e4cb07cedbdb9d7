//! HTTP surface (feature `server-adapters`)
//!
//! | Method | Path                          | Handler                       |
//! |--------|-------------------------------|-------------------------------|
//! | POST   | `/api/chat/send`              | SSE relay of one chat turn    |
//! | POST   | `/api/chat/session`           | create an empty session       |
//! | GET    | `/api/chat/session/{id}`      | transcript and timestamps     |
//! | DELETE | `/api/chat/session/{id}`      | drop a session                |
//! | GET    | `/api/chat/stats`             | session count and model info  |
//! | GET    | `/health`                     | liveness                      |

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;

use crate::rate_limit::RateLimiter;
use crate::relay::ChatRelay;

pub mod handlers;
pub mod sse;

pub use sse::to_sse_response;

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub relay: ChatRelay,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(relay: ChatRelay, rate_limiter: RateLimiter) -> Self {
        Self {
            relay,
            rate_limiter: Arc::new(rate_limiter),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat/send", post(handlers::send_message))
        .route("/api/chat/session", post(handlers::create_session))
        .route(
            "/api/chat/session/{session_id}",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/api/chat/stats", get(handlers::stats))
        .route("/health", get(handlers::health))
        .with_state(state)
}

/// Serve until `shutdown` resolves. In-flight streams are allowed to finish.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}
