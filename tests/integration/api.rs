// tests/integration/api.rs
use super::{json, start_time, Arc, TestEnv, Uuid, COUPLE_ID, USER_ID};
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use coach_controller::api::routes::{create_router, AppState};
use coach_controller::config::Config;
use coach_controller::orchestrator::{quota_tracker::week_start, SessionOrchestrator};
use coach_controller::storage::UsageStore;
use serde_json::Value;
use tower::ServiceExt;

struct TestApp {
    env: TestEnv,
    token: String,
}

impl TestApp {
    async fn new(is_premium: bool) -> Self {
        let env = TestEnv::new().await;
        env.seed_couple(is_premium).await;
        let token = env.identity.issue_token(USER_ID, start_time()).await.unwrap();
        Self { env, token }
    }

    fn router(&self) -> Router {
        self.router_with(self.env.orchestrator(), Config::default())
    }

    fn router_with(&self, orchestrator: SessionOrchestrator, config: Config) -> Router {
        let state = AppState::new(
            Arc::new(config),
            Arc::new(orchestrator),
            self.env.identity.clone(),
        );
        create_router(state)
    }

    fn get(&self, uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .body(Body::empty())
            .unwrap()
    }

    fn post(&self, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/coach/messages")
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_post_message_success() {
    let app = TestApp::new(false).await;

    let (status, body) = send(
        app.router(),
        app.post(json!({ "message": "Hi coach", "coupleId": COUPLE_ID })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["messagesRemaining"], 19);
    assert_eq!(body["isPremium"], false);
    assert_eq!(body["message"]["role"], "assistant");
    assert_eq!(body["message"]["content"], "Coach reply 1");
    assert!(Uuid::parse_str(body["conversationId"].as_str().unwrap()).is_ok());
}

#[tokio::test]
async fn test_missing_or_bad_credentials_are_unauthorized() {
    let app = TestApp::new(false).await;

    let request = Request::builder()
        .uri("/coach/conversations")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app.router(), request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let request = Request::builder()
        .uri("/coach/conversations")
        .header(header::AUTHORIZATION, "Bearer nope")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(app.router(), request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/coach/conversations")
        .header(header::AUTHORIZATION, format!("Basic {}", app.token))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(app.router(), request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_validation_failures_are_bad_request() {
    let app = TestApp::new(false).await;

    for body in [
        json!({ "message": "   ", "coupleId": COUPLE_ID }),
        json!({ "message": "hello" }),
        json!({ "coupleId": COUPLE_ID }),
        json!({ "message": "hello", "coupleId": COUPLE_ID, "conversationId": "not-a-uuid" }),
    ] {
        let (status, response) = send(app.router(), app.post(body.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert!(response["error"].is_string());
    }

    let request = Request::builder()
        .method("POST")
        .uri("/coach/messages")
        .header(header::AUTHORIZATION, format!("Bearer {}", app.token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = send(app.router(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_limit_reached_returns_payment_required() {
    let app = TestApp::new(false).await;
    let week = week_start(start_time());
    app.env.usage.insert_initial(USER_ID, week).await.unwrap();
    for _ in 1..20 {
        app.env.usage.increment(USER_ID, week).await.unwrap();
    }

    let (status, body) = send(
        app.router(),
        app.post(json!({ "message": "hello", "coupleId": COUPLE_ID })),
    )
    .await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"], "Weekly limit reached");
    assert_eq!(body["limitReached"], true);
    assert_eq!(body["messagesRemaining"], 0);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn test_missing_llm_credential_is_service_unavailable() {
    let app = TestApp::new(false).await;
    let router = app.router_with(app.env.orchestrator_without_llm(), Config::default());

    let (status, body) = send(
        router,
        app.post(json!({ "message": "hello", "coupleId": COUPLE_ID })),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_llm_failure_is_generic_internal_error() {
    let app = TestApp::new(false).await;
    app.env.llm.set_failing(true);

    let (status, body) = send(
        app.router(),
        app.post(json!({ "message": "hello", "coupleId": COUPLE_ID })),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let error = body["error"].as_str().unwrap();
    assert!(!error.contains("overloaded"));
}

#[tokio::test]
async fn test_get_messages_for_conversation() {
    let app = TestApp::new(false).await;
    let (_, posted) = send(
        app.router(),
        app.post(json!({ "message": "hello", "coupleId": COUPLE_ID })),
    )
    .await;
    let conversation_id = posted["conversationId"].as_str().unwrap().to_string();

    let (status, body) = send(
        app.router(),
        app.get(&format!("/coach/messages?conversationId={conversation_id}")),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(body["messagesRemaining"], 19);
    assert_eq!(body["isPremium"], false);
}

#[tokio::test]
async fn test_unknown_conversation_is_not_found() {
    let app = TestApp::new(false).await;

    let (status, _) = send(
        app.router(),
        app.get(&format!("/coach/messages?conversationId={}", Uuid::new_v4())),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        app.router(),
        app.post(json!({
            "message": "hello",
            "coupleId": COUPLE_ID,
            "conversationId": Uuid::new_v4().to_string()
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_opener() {
    let app = TestApp::new(true).await;

    let (status, body) = send(
        app.router(),
        app.get(&format!("/coach/messages?getOpener=true&coupleId={COUPLE_ID}")),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["recentActivity"].is_null());
    assert_eq!(body["userName"], "Sam");
    assert!(body["messagesRemaining"].is_null());
    assert_eq!(body["isPremium"], true);
    assert!(body["opener"].as_str().unwrap().contains("Sam"));

    let (status, _) = send(app.router(), app.get("/coach/messages")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_foreign_couple_is_not_found() {
    let app = TestApp::new(false).await;
    let now = start_time();
    let relationships = &app.env.relationships;
    relationships.upsert_user("user-c", Some("Drew"), false, now).await.unwrap();
    relationships
        .create_couple("couple-2", "user-c", None, now)
        .await
        .unwrap();
    relationships
        .record_date("couple-2", "Secret anniversary", Some(now), None)
        .await
        .unwrap();

    for uri in [
        "/coach/messages?getOpener=true&coupleId=couple-2",
        "/coach/session?coupleId=couple-2",
    ] {
        let (status, body) = send(app.router(), app.get(uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert!(!body.to_string().contains("Secret anniversary"));
    }

    let (status, _) = send(
        app.router(),
        app.post(json!({ "message": "hello", "coupleId": "couple-2" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_session_starts_then_resumes() {
    let app = TestApp::new(false).await;
    let uri = format!("/coach/session?coupleId={COUPLE_ID}");

    let (status, body) = send(app.router(), app.get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "started");
    assert_eq!(body["messagesRemaining"], 20);

    let (_, posted) = send(
        app.router(),
        app.post(json!({ "message": "hello", "coupleId": COUPLE_ID })),
    )
    .await;

    let (status, body) = send(app.router(), app.get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "resumed");
    assert_eq!(body["conversationId"], posted["conversationId"]);
    assert_eq!(body["messages"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_list_conversations() {
    let app = TestApp::new(false).await;
    for _ in 0..2 {
        send(
            app.router(),
            app.post(json!({ "message": "hello", "coupleId": COUPLE_ID })),
        )
        .await;
    }

    let (status, body) = send(app.router(), app.get("/coach/conversations")).await;
    assert_eq!(status, StatusCode::OK);
    let conversations = body["conversations"].as_array().unwrap();
    assert_eq!(conversations.len(), 2);
    assert_eq!(conversations[0]["userId"], USER_ID);
}

#[tokio::test]
async fn test_rate_limit_applies_to_coach_routes() {
    let app = TestApp::new(false).await;
    let config = Config {
        rest_rate_limit_per_minute: 2,
        ..Config::default()
    };
    let router = app.router_with(app.env.orchestrator(), config);

    let mut statuses = vec![];
    for _ in 0..3 {
        let (status, _) = send(router.clone(), app.get("/coach/conversations")).await;
        statuses.push(status);
    }
    assert_eq!(
        statuses,
        vec![StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]
    );

    // Health is outside the limiter.
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
