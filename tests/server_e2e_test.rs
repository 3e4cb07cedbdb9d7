//! HTTP surface end to end: axum server, relay and OpenAI adapter over wiremock.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use showmyai::config::{OpenAiConfig, RateLimitConfig};
use showmyai::providers::{ChatProvider, OpenAiProvider};
use showmyai::rate_limit::RateLimiter;
use showmyai::relay::ChatRelay;
use showmyai::selector::ProviderSelector;
use showmyai::server::{self, AppState};
use showmyai::session::SessionStore;
use showmyai::types::ProviderType;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HELLO_SSE: &str = concat!(
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"\"},\"finish_reason\":null}]}\n\n",
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hello\"},\"finish_reason\":null}]}\n\n",
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\" world\"},\"finish_reason\":null}]}\n\n",
    "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
    "data: [DONE]\n\n",
);

struct TestApp {
    base: String,
    client: reqwest::Client,
    sessions: Arc<SessionStore>,
    _upstream: MockServer,
}

impl TestApp {
    async fn start(upstream_response: ResponseTemplate, rate_limit: RateLimitConfig) -> Self {
        Self::start_with(upstream_response, rate_limit, true).await
    }

    async fn start_with(
        upstream_response: ResponseTemplate,
        rate_limit: RateLimitConfig,
        initialize: bool,
    ) -> Self {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(upstream_response)
            .mount(&upstream)
            .await;

        let mut provider = OpenAiProvider::new(
            OpenAiConfig::new("test-api-key").with_base_url(format!("{}/v1", upstream.uri())),
        );
        if initialize {
            provider.initialize().await.unwrap();
        }
        let selector = ProviderSelector::new(ProviderType::OpenAi, vec![Box::new(provider)]);

        let sessions = Arc::new(SessionStore::new(Duration::from_secs(3600)));
        let relay = ChatRelay::new(Arc::clone(&sessions), Arc::new(selector));
        let state = AppState::new(relay, RateLimiter::new(rate_limit));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(server::serve(listener, state, std::future::pending()));

        Self {
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
            sessions,
            _upstream: upstream,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn send(&self, body: Value) -> reqwest::Response {
        self.client
            .post(self.url("/api/chat/send"))
            .json(&body)
            .send()
            .await
            .unwrap()
    }
}

fn sse_ok() -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(HELLO_SSE)
}

fn generous_limit() -> RateLimitConfig {
    RateLimitConfig {
        window: Duration::from_secs(3600),
        max_requests: 100,
    }
}

/// Parse the `data:` payloads of an SSE body.
fn sse_frames(body: &str) -> Vec<Value> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect()
}

#[tokio::test]
async fn chat_turn_streams_session_tokens_and_done() {
    let app = TestApp::start(sse_ok(), generous_limit()).await;

    let response = app.send(serde_json::json!({"message": "Hello"})).await;
    assert_eq!(response.status(), 200);
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    let frames = sse_frames(&response.text().await.unwrap());
    assert_eq!(frames.len(), 4);
    assert_eq!(frames[0]["type"], "session");
    let session_id = frames[0]["sessionId"].as_str().unwrap().to_string();
    assert_eq!(frames[1], serde_json::json!({"token": "Hello", "done": false}));
    assert_eq!(frames[2], serde_json::json!({"token": " world", "done": false}));
    assert_eq!(
        frames[3],
        serde_json::json!({"token": "", "done": true, "finishReason": "stop"})
    );

    let session: Value = app
        .client
        .get(app.url(&format!("/api/chat/session/{session_id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(session["sessionId"], session_id.as_str());
    assert_eq!(session["messageCount"], 2);
    let history = session["conversationHistory"].as_array().unwrap();
    assert_eq!(history[0]["content"], "Hello");
    assert_eq!(history[1]["content"], "Hello world");

    // Second turn reuses the session.
    let response = app
        .send(serde_json::json!({"message": "Again", "sessionId": session_id}))
        .await;
    let frames = sse_frames(&response.text().await.unwrap());
    assert_eq!(frames[0]["sessionId"], session_id.as_str());
    assert_eq!(app.sessions.get(&session_id).await.unwrap().message_count(), 4);
}

#[tokio::test]
async fn unknown_session_id_starts_a_new_session() {
    let app = TestApp::start(sse_ok(), generous_limit()).await;
    let stale = uuid::Uuid::new_v4().to_string();

    let response = app
        .send(serde_json::json!({"message": "Hello", "sessionId": stale}))
        .await;
    assert_eq!(response.status(), 200);

    let frames = sse_frames(&response.text().await.unwrap());
    let session_id = frames[0]["sessionId"].as_str().unwrap();
    assert_ne!(session_id, stale);
    assert_eq!(app.sessions.count().await, 1);
}

#[tokio::test]
async fn invalid_requests_are_rejected_without_creating_sessions() {
    let app = TestApp::start(sse_ok(), generous_limit()).await;

    let response = app.send(serde_json::json!({"message": "a".repeat(501)})).await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["errors"][0]["field"], "message");
    assert_eq!(
        body["errors"][0]["message"],
        "Message must be less than 500 characters"
    );

    let response = app.send(serde_json::json!({"message": "   "})).await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["errors"][0]["message"], "Message is required");

    let response = app
        .send(serde_json::json!({"message": "Hi", "sessionId": "not-a-uuid"}))
        .await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["errors"][0]["message"], "Invalid session ID format");

    let response = app
        .client
        .post(app.url("/api/chat/send"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Invalid request body");

    assert_eq!(app.sessions.count().await, 0);
}

#[tokio::test]
async fn upstream_failure_becomes_an_error_frame() {
    let upstream = ResponseTemplate::new(401).set_body_json(serde_json::json!({
        "error": {"message": "Incorrect API key provided: test****", "code": "invalid_api_key"}
    }));
    let app = TestApp::start(upstream, generous_limit()).await;

    let response = app.send(serde_json::json!({"message": "Hello"})).await;
    assert_eq!(response.status(), 200);
    let frames = sse_frames(&response.text().await.unwrap());
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0]["type"], "session");
    assert_eq!(
        frames[1],
        serde_json::json!({"type": "error", "error": "Invalid OpenAI API key"})
    );

    // The user turn is kept, no assistant reply is stored.
    let session_id = frames[0]["sessionId"].as_str().unwrap();
    assert_eq!(app.sessions.get(session_id).await.unwrap().message_count(), 1);
}

#[tokio::test]
async fn uninitialized_provider_is_service_unavailable() {
    let app = TestApp::start_with(sse_ok(), generous_limit(), false).await;

    let response = app.send(serde_json::json!({"message": "Hello"})).await;
    assert_eq!(response.status(), 503);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "AI service is not initialized");
    assert_eq!(app.sessions.count().await, 0);
}

#[tokio::test]
async fn send_is_rate_limited_per_caller() {
    let app = TestApp::start(
        sse_ok(),
        RateLimitConfig {
            window: Duration::from_secs(3600),
            max_requests: 1,
        },
    )
    .await;

    let first = app.send(serde_json::json!({"message": "Hello"})).await;
    assert_eq!(first.status(), 200);
    first.text().await.unwrap();

    let second = app.send(serde_json::json!({"message": "Hello"})).await;
    assert_eq!(second.status(), 429);
    let retry_after: u64 = second.headers()["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0 && retry_after <= 3600);

    let body: Value = second.json().await.unwrap();
    assert_eq!(body["error"], "Rate limit exceeded");
    assert_eq!(body["retryAfter"], retry_after);
}

#[tokio::test]
async fn rotating_unknown_session_ids_share_the_caller_limit() {
    let app = TestApp::start(
        sse_ok(),
        RateLimitConfig {
            window: Duration::from_secs(3600),
            max_requests: 1,
        },
    )
    .await;

    let fresh = || uuid::Uuid::new_v4().to_string();
    let first = app
        .send(serde_json::json!({"message": "Hello", "sessionId": fresh()}))
        .await;
    assert_eq!(first.status(), 200);
    first.text().await.unwrap();

    let second = app
        .send(serde_json::json!({"message": "Hello", "sessionId": fresh()}))
        .await;
    assert_eq!(second.status(), 429);
    assert_eq!(app.sessions.count().await, 1);
}

#[tokio::test]
async fn live_sessions_have_their_own_limit() {
    let app = TestApp::start(
        sse_ok(),
        RateLimitConfig {
            window: Duration::from_secs(3600),
            max_requests: 1,
        },
    )
    .await;
    let session_id = app.sessions.create().await;

    let first = app
        .send(serde_json::json!({"message": "Hello", "sessionId": session_id}))
        .await;
    assert_eq!(first.status(), 200);
    first.text().await.unwrap();

    // The caller's IP budget is still untouched.
    let anonymous = app.send(serde_json::json!({"message": "Hello"})).await;
    assert_eq!(anonymous.status(), 200);
    anonymous.text().await.unwrap();

    let again = app
        .send(serde_json::json!({"message": "Hello", "sessionId": session_id}))
        .await;
    assert_eq!(again.status(), 429);
}

#[tokio::test]
async fn session_lifecycle_endpoints() {
    let app = TestApp::start(sse_ok(), generous_limit()).await;

    let created: Value = app
        .client
        .post(app.url("/api/chat/session"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let session_id = created["sessionId"].as_str().unwrap().to_string();
    assert!(uuid::Uuid::parse_str(&session_id).is_ok());
    assert!(created["createdAt"].as_i64().unwrap() > 0);

    let session_url = app.url(&format!("/api/chat/session/{session_id}"));
    let fetched: Value = app
        .client
        .get(&session_url)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["messageCount"], 0);

    let deleted = app.client.delete(&session_url).send().await.unwrap();
    assert_eq!(deleted.status(), 200);
    let body: Value = deleted.json().await.unwrap();
    assert_eq!(
        body,
        serde_json::json!({"success": true, "message": "Session deleted successfully"})
    );

    let missing = app.client.get(&session_url).send().await.unwrap();
    assert_eq!(missing.status(), 404);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["error"], "Session not found");

    let missing = app.client.delete(&session_url).send().await.unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn stats_and_health() {
    let app = TestApp::start(sse_ok(), generous_limit()).await;
    app.sessions.create().await;

    let stats: Value = app
        .client
        .get(app.url("/api/chat/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        stats,
        serde_json::json!({
            "activeSessions": 1,
            "aiInitialized": true,
            "provider": "OpenAI",
            "model": "gpt-3.5-turbo",
        })
    );

    let health: Value = app
        .client
        .get(app.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["service"], "Show My AI");
    assert!(chrono::DateTime::parse_from_rfc3339(health["timestamp"].as_str().unwrap()).is_ok());
}
