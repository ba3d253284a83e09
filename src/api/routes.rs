use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, FromRef, Query, State},
    middleware,
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::api::dto::*;
use crate::api::error::ApiError;
use crate::api::rate_limiter::{rate_limit_middleware, RateLimiter};
use crate::auth::{AuthUser, IdentityVerifier};
use crate::config::Config;
use crate::models::internal::{
    ActivitySignal, Conversation, Message, MessageRole, ProactivePrompt, SignalKind,
};
use crate::orchestrator::{Opener, SessionOrchestrator, SessionState};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<SessionOrchestrator>,
    pub identity: Arc<dyn IdentityVerifier>,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        orchestrator: Arc<SessionOrchestrator>,
        identity: Arc<dyn IdentityVerifier>,
    ) -> Self {
        let rate_limiter = RateLimiter::new(config.rest_rate_limit_per_minute);
        Self {
            config,
            orchestrator,
            identity,
            rate_limiter,
        }
    }
}

impl FromRef<AppState> for Arc<dyn IdentityVerifier> {
    fn from_ref(state: &AppState) -> Self {
        state.identity.clone()
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Coach Controller API",
        description = "Coaching sessions with weekly message quotas"
    ),
    paths(post_message, get_messages, get_session, list_conversations),
    components(schemas(
        PostMessageRequest,
        PostMessageResponse,
        MessagesResponse,
        OpenerResponse,
        ResumedSession,
        ConversationsResponse,
        ErrorResponse,
        LimitReachedResponse,
        Conversation,
        Message,
        MessageRole,
        ActivitySignal,
        SignalKind,
        ProactivePrompt,
    )),
    tags((name = "coach", description = "Coaching sessions"))
)]
pub struct ApiDoc;

fn parse_conversation_id(raw: Option<&str>) -> Result<Option<Uuid>, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => Uuid::parse_str(s)
            .map(Some)
            .map_err(|_| ApiError::BadRequest("Invalid conversationId".to_string())),
    }
}

fn opener_response(opener: Opener) -> OpenerResponse {
    OpenerResponse {
        opener: opener.opener,
        recent_activity: Some(opener.recent_activity).filter(|a| !a.is_none()),
        proactive_prompt: opener.proactive_prompt,
        user_name: opener.user_name,
        messages_remaining: opener.quota.messages_remaining,
        is_premium: opener.quota.is_premium,
    }
}

#[utoipa::path(
    post,
    path = "/coach/messages",
    tag = "coach",
    request_body = PostMessageRequest,
    responses(
        (status = 200, description = "Coach reply", body = PostMessageResponse),
        (status = 400, description = "Missing message or coupleId", body = ErrorResponse),
        (status = 401, description = "Missing or invalid credential", body = ErrorResponse),
        (status = 402, description = "Weekly limit reached", body = LimitReachedResponse),
        (status = 404, description = "Unknown conversation", body = ErrorResponse),
        (status = 503, description = "Coach not configured", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn post_message(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<PostMessageRequest>, JsonRejection>,
) -> Result<Json<PostMessageResponse>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let conversation_id = parse_conversation_id(req.conversation_id.as_deref())?;

    let outcome = state
        .orchestrator
        .post_message(
            &user,
            req.couple_id.as_deref().unwrap_or_default(),
            conversation_id,
            req.message.as_deref().unwrap_or_default(),
        )
        .await?;

    Ok(Json(PostMessageResponse {
        success: true,
        conversation_id: outcome.conversation_id,
        message: outcome.message,
        messages_remaining: outcome.messages_remaining,
        is_premium: outcome.is_premium,
    }))
}

/// Either a conversation's messages (`conversationId`) or a fresh opener
/// (`getOpener=true&coupleId=...`).
#[utoipa::path(
    get,
    path = "/coach/messages",
    tag = "coach",
    params(MessagesQuery),
    responses(
        (status = 200, description = "Messages, or an opener when getOpener=true", body = MessagesResponse),
        (status = 400, description = "Neither conversationId nor getOpener given", body = ErrorResponse),
        (status = 404, description = "Unknown conversation", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn get_messages(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    query: Result<Query<MessagesQuery>, QueryRejection>,
) -> Result<Json<CoachMessagesResponse>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    if query.get_opener.unwrap_or(false) {
        let opener = state
            .orchestrator
            .opener(&user, query.couple_id.as_deref().unwrap_or_default())
            .await?;
        return Ok(Json(CoachMessagesResponse::Opener(opener_response(opener))));
    }

    let conversation_id = parse_conversation_id(query.conversation_id.as_deref())?
        .ok_or_else(|| ApiError::BadRequest("conversationId is required".to_string()))?;

    let view = state
        .orchestrator
        .conversation_messages(&user, conversation_id)
        .await?;

    Ok(Json(CoachMessagesResponse::Messages(MessagesResponse {
        conversation_id: view.conversation.id,
        messages: view.messages,
        messages_remaining: view.quota.messages_remaining,
        is_premium: view.quota.is_premium,
    })))
}

#[utoipa::path(
    get,
    path = "/coach/session",
    tag = "coach",
    params(SessionQuery),
    responses(
        (status = 200, description = "Resumed conversation or a fresh opener"),
        (status = 400, description = "Missing coupleId", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn get_session(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    query: Result<Query<SessionQuery>, QueryRejection>,
) -> Result<Json<SessionResponse>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let session = state
        .orchestrator
        .start_or_resume(&user, query.couple_id.as_deref().unwrap_or_default())
        .await?;

    let response = match session {
        SessionState::Resumed {
            conversation,
            messages,
            quota,
        } => SessionResponse::Resumed(ResumedSession {
            conversation_id: conversation.id,
            messages,
            messages_remaining: quota.messages_remaining,
            is_premium: quota.is_premium,
        }),
        SessionState::Started(opener) => SessionResponse::Started(opener_response(opener)),
    };

    Ok(Json(response))
}

#[utoipa::path(
    get,
    path = "/coach/conversations",
    tag = "coach",
    responses(
        (status = 200, description = "Most recently updated conversations", body = ConversationsResponse)
    ),
    security(("bearer" = []))
)]
pub async fn list_conversations(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<ConversationsResponse>, ApiError> {
    let conversations = state.orchestrator.list_conversations(&user).await?;
    Ok(Json(ConversationsResponse { conversations }))
}

pub async fn health() -> &'static str {
    "OK"
}

pub fn create_router(state: AppState) -> Router {
    let coach = Router::new()
        .route("/coach/messages", get(get_messages).post(post_message))
        .route("/coach/session", get(get_session))
        .route("/coach/conversations", get(list_conversations))
        .route_layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ));

    let router = Router::new()
        .merge(coach)
        .route("/health", get(health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http());

    let router = if state.config.cors_enabled {
        router.layer(CorsLayer::permissive())
    } else {
        router
    };

    router.with_state(state)
}
