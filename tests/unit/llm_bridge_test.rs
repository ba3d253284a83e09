use chrono::Utc;
use coach_controller::config::Config;
use coach_controller::models::internal::{Message, MessageRole};
use coach_controller::services::llm_bridge_client::{
    CompletionProvider, LlmBridgeClient, LlmBridgeError,
};
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn user_message(content: &str) -> Message {
    Message {
        id: Uuid::new_v4(),
        conversation_id: Uuid::nil(),
        role: MessageRole::User,
        content: content.to_string(),
        created_at: Utc::now(),
    }
}

fn client_for(server: &MockServer, timeout: Duration) -> LlmBridgeClient {
    LlmBridgeClient::new(
        server.uri(),
        "test-api-key".to_string(),
        "test-model".to_string(),
        256,
        timeout,
    )
    .unwrap()
}

#[tokio::test]
async fn test_complete_returns_joined_text_blocks() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-api-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "max_tokens": 256,
            "system": "be kind",
            "messages": [{ "role": "user", "content": "hello" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [
                { "type": "text", "text": "Hi there. " },
                { "type": "text", "text": "How are you?" }
            ],
            "stop_reason": "end_turn"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = client_for(&server, Duration::from_secs(5))
        .complete("be kind", &[user_message("hello")])
        .await
        .unwrap();

    assert_eq!(reply, "Hi there. How are you?");
}

#[tokio::test]
async fn test_provider_error_status_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let err = client_for(&server, Duration::from_secs(5))
        .complete("system", &[user_message("hello")])
        .await
        .unwrap_err();

    match err {
        LlmBridgeError::ApiError { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "upstream exploded");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_slow_provider_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "content": [{ "type": "text", "text": "late" }] }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let err = client_for(&server, Duration::from_millis(200))
        .complete("system", &[user_message("hello")])
        .await
        .unwrap_err();

    assert!(matches!(err, LlmBridgeError::Timeout(_)), "{err:?}");
}

#[tokio::test]
async fn test_empty_completion_is_invalid() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "content": [] })))
        .mount(&server)
        .await;

    let err = client_for(&server, Duration::from_secs(5))
        .complete("system", &[user_message("hello")])
        .await
        .unwrap_err();

    assert!(matches!(err, LlmBridgeError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_history_without_user_turn_is_rejected_locally() {
    let server = MockServer::start().await;
    let assistant_only = Message {
        role: MessageRole::Assistant,
        ..user_message("hi")
    };

    let err = client_for(&server, Duration::from_secs(5))
        .complete("system", &[assistant_only])
        .await
        .unwrap_err();

    assert!(matches!(err, LlmBridgeError::InvalidResponse(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[test]
fn test_from_config_builds_client_when_key_present() {
    let config = Config {
        llm_api_key: Some("sk-test-0123456789abcdef".to_string()),
        llm_model: "some-model".to_string(),
        ..Config::default()
    };

    let client = LlmBridgeClient::from_config(&config).unwrap().unwrap();
    assert_eq!(client.model(), "some-model");
}
