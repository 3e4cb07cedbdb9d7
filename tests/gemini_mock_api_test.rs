//! Gemini adapter against a mocked `streamGenerateContent` endpoint.

use futures_util::StreamExt;
use showmyai::config::GeminiConfig;
use showmyai::error::{LlmError, UpstreamErrorKind};
use showmyai::providers::{ChatProvider, GeminiProvider};
use showmyai::types::{FinishReason, Message, StreamDelta};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STREAM_PATH: &str = "/v1beta/models/gemini-1.5-flash-latest:streamGenerateContent";

fn candidate(text: &str, finish_reason: Option<&str>) -> String {
    let mut candidate = serde_json::json!({
        "content": {"role": "model", "parts": [{"text": text}]},
        "index": 0,
    });
    if let Some(reason) = finish_reason {
        candidate["finishReason"] = serde_json::json!(reason);
    }
    let chunk = serde_json::json!({
        "candidates": [candidate],
        "modelVersion": "gemini-1.5-flash-002",
    });
    format!("data: {chunk}\r\n\r\n")
}

fn sse_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

async fn ready_provider(server: &MockServer) -> GeminiProvider {
    let mut provider = GeminiProvider::new(
        GeminiConfig::new("gemini-test-key").with_base_url(format!("{}/v1beta", server.uri())),
    );
    provider.initialize().await.unwrap();
    provider
}

#[tokio::test]
async fn streams_candidate_text_and_stop() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .and(query_param("alt", "sse"))
        .and(header("x-goog-api-key", "gemini-test-key"))
        .and(body_partial_json(serde_json::json!({
            "contents": [
                {"role": "user", "parts": [{"text": "Hi"}]},
                {"role": "model", "parts": [{"text": "Hello!"}]},
                {"role": "user", "parts": [{"text": "Tell me a joke"}]},
            ],
            "generationConfig": {"maxOutputTokens": 1000},
        })))
        .respond_with(sse_response(
            [
                candidate("Why did", None),
                candidate(" the chicken", None),
                candidate("", Some("STOP")),
            ]
            .concat(),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let provider = ready_provider(&server).await;
    let history = [
        Message::user("Hi"),
        Message::assistant("Hello!"),
        Message::user("Tell me a joke"),
    ];
    let deltas: Vec<StreamDelta> = provider
        .stream_chat(&history)
        .await
        .unwrap()
        .map(|d| d.unwrap())
        .collect()
        .await;

    assert_eq!(
        deltas,
        vec![
            StreamDelta::token("Why did"),
            StreamDelta::token(" the chicken"),
            StreamDelta::terminal(FinishReason::Stop),
        ]
    );
}

#[tokio::test]
async fn max_tokens_and_safety_map_to_finish_reasons() {
    for (raw, expected) in [
        ("MAX_TOKENS", FinishReason::Length),
        ("SAFETY", FinishReason::ContentFilter),
    ] {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(STREAM_PATH))
            .respond_with(sse_response(candidate("partial", Some(raw))))
            .mount(&server)
            .await;

        let provider = ready_provider(&server).await;
        let deltas: Vec<StreamDelta> = provider
            .stream_chat(&[Message::user("Hi")])
            .await
            .unwrap()
            .map(|d| d.unwrap())
            .collect()
            .await;

        let last = deltas.last().unwrap();
        assert!(last.done);
        assert_eq!(last.finish_reason, Some(expected), "{raw}");
        assert_eq!(deltas.iter().filter(|d| d.done).count(), 1);
    }
}

#[tokio::test]
async fn status_errors_are_classified() {
    let cases = [
        (
            400,
            serde_json::json!({"error": {
                "code": 400,
                "message": "API key not valid. Please pass a valid API key.",
                "status": "INVALID_ARGUMENT",
                "details": [{"@type": "type.googleapis.com/google.rpc.ErrorInfo", "reason": "API_KEY_INVALID"}],
            }}),
            UpstreamErrorKind::Auth,
        ),
        (
            429,
            serde_json::json!({"error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}}),
            UpstreamErrorKind::RateLimited,
        ),
        (
            404,
            serde_json::json!({"error": {"code": 404, "message": "models/nope is not found", "status": "NOT_FOUND"}}),
            UpstreamErrorKind::ModelUnavailable,
        ),
        (
            503,
            serde_json::json!({"error": {"code": 503, "message": "The model is overloaded", "status": "UNAVAILABLE"}}),
            UpstreamErrorKind::ServiceUnavailable,
        ),
    ];

    for (status, body, expected) in cases {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(STREAM_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&server)
            .await;

        let provider = ready_provider(&server).await;
        let err = provider
            .stream_chat(&[Message::user("Hi")])
            .await
            .err()
            .unwrap();
        assert_eq!(err.upstream_kind(), Some(expected), "status {status}: {err}");
    }
}

#[tokio::test]
async fn blocked_prompt_ends_with_content_filter() {
    let server = MockServer::start().await;
    let body = format!(
        "data: {}\r\n\r\n",
        serde_json::json!({"promptFeedback": {"blockReason": "SAFETY"}})
    );
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(sse_response(body))
        .mount(&server)
        .await;

    let provider = ready_provider(&server).await;
    let deltas: Vec<_> = provider
        .stream_chat(&[Message::user("Hi")])
        .await
        .unwrap()
        .collect()
        .await;
    assert!(matches!(
        deltas.as_slice(),
        [Ok(StreamDelta { done: true, finish_reason: Some(FinishReason::ContentFilter), .. })]
    ));
}

#[tokio::test]
async fn missing_key_is_a_configuration_error() {
    let mut provider = GeminiProvider::new(GeminiConfig::default());
    assert!(matches!(
        provider.initialize().await,
        Err(LlmError::ConfigurationError(_))
    ));
    assert_eq!(provider.model_info().provider, "Google Gemini");
    assert_eq!(provider.model_info().model, "gemini-1.5-flash-latest");
}
