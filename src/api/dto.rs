use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::models::internal::{ActivitySignal, Conversation, Message, ProactivePrompt};

// ==================== REQUEST DTOs ====================

/// Fields are optional at the wire level so that missing values surface as
/// 400 validation errors rather than deserialization rejections.
#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostMessageRequest {
    pub message: Option<String>,
    pub conversation_id: Option<String>,
    pub couple_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct MessagesQuery {
    pub conversation_id: Option<String>,
    pub get_opener: Option<bool>,
    pub couple_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct SessionQuery {
    pub couple_id: Option<String>,
}

// ==================== RESPONSE DTOs ====================

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostMessageResponse {
    pub success: bool,
    pub conversation_id: Uuid,
    pub message: Message,
    pub messages_remaining: Option<u32>,
    pub is_premium: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessagesResponse {
    pub conversation_id: Uuid,
    pub messages: Vec<Message>,
    pub messages_remaining: Option<u32>,
    pub is_premium: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpenerResponse {
    pub opener: String,
    /// `null` when nothing notable happened recently.
    pub recent_activity: Option<ActivitySignal>,
    pub proactive_prompt: Option<ProactivePrompt>,
    pub user_name: Option<String>,
    pub messages_remaining: Option<u32>,
    pub is_premium: bool,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CoachMessagesResponse {
    Messages(MessagesResponse),
    Opener(OpenerResponse),
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SessionResponse {
    Resumed(ResumedSession),
    Started(OpenerResponse),
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResumedSession {
    pub conversation_id: Uuid,
    pub messages: Vec<Message>,
    pub messages_remaining: Option<u32>,
    pub is_premium: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConversationsResponse {
    pub conversations: Vec<Conversation>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LimitReachedResponse {
    pub error: String,
    pub limit_reached: bool,
    pub message: String,
    pub messages_remaining: u32,
}
