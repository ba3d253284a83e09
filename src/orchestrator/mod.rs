pub mod activity_signals;
pub mod context_assembly;
pub mod insight_engine;
pub mod pattern_analysis;
pub mod quota_tracker;

use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::models::internal::{
    ActivitySignal, Conversation, Message, MessageRole, ProactivePrompt, UserProfile,
};
use crate::services::clock::Clock;
use crate::services::llm_bridge_client::{CompletionProvider, LlmBridgeError};
use crate::storage::relationship_repository::RelationshipRepository;
use crate::storage::repository::{ConversationRepository, RepositoryError};
use crate::storage::usage_repository::UsageStore;

use activity_signals::ActivitySignalReader;
use context_assembly::ContextBuilder;
use insight_engine::InsightEngine;
use quota_tracker::{QuotaError, QuotaTracker};

pub const WEEKLY_MESSAGE_LIMIT: u32 = 20;
pub const RESUME_WINDOW_HOURS: i64 = 24;
pub const HISTORY_WINDOW: u64 = 20;
pub const CONVERSATION_LIST_LIMIT: u64 = 20;
pub const CONCERN_WINDOW_DAYS: i64 = 7;
/// Messages returned when a client displays a conversation.
pub const DISPLAY_MESSAGE_LIMIT: u64 = 200;
pub const MAX_MESSAGE_CHARS: usize = 4000;

pub const LIMIT_REACHED_MESSAGE: &str = "You've used all of your free coaching messages for this week. \
Upgrade to premium for unlimited coaching, or come back on Monday.";

#[derive(Debug, thiserror::Error)]
pub enum CoachError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Weekly limit of {limit} messages reached")]
    QuotaExceeded { limit: u32 },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Persistence error: {0}")]
    Persistence(#[from] RepositoryError),
    #[error("Quota read failed: {0}")]
    QuotaRead(#[source] QuotaError),
    #[error("Coach is not configured")]
    LlmUnavailable,
    #[error("LLM call failed: {0}")]
    LlmCall(#[from] LlmBridgeError),
}

/// Tunables taken from configuration.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    pub weekly_limit: u32,
    pub history_window: u64,
    pub concern_window_days: i64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            weekly_limit: WEEKLY_MESSAGE_LIMIT,
            history_window: HISTORY_WINDOW,
            concern_window_days: CONCERN_WINDOW_DAYS,
        }
    }
}

impl From<&Config> for OrchestratorSettings {
    fn from(config: &Config) -> Self {
        Self {
            weekly_limit: config.weekly_message_limit,
            history_window: config.history_window,
            concern_window_days: config.concern_window_days,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatus {
    /// `None` for premium users, or when the count could not be confirmed.
    pub messages_remaining: Option<u32>,
    pub is_premium: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opener {
    pub opener: String,
    pub recent_activity: ActivitySignal,
    pub proactive_prompt: Option<ProactivePrompt>,
    pub user_name: Option<String>,
    pub quota: QuotaStatus,
}

#[derive(Debug, Clone)]
pub enum SessionState {
    Resumed {
        conversation: Conversation,
        messages: Vec<Message>,
        quota: QuotaStatus,
    },
    Started(Opener),
}

#[derive(Debug, Clone)]
pub struct PostMessageOutcome {
    pub conversation_id: Uuid,
    pub message: Message,
    pub messages_remaining: Option<u32>,
    pub is_premium: bool,
}

#[derive(Debug, Clone)]
pub struct ConversationMessages {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
    pub quota: QuotaStatus,
}

/// Entry point for coaching sessions: start-or-resume, post-message, and the
/// read-only views around them.
pub struct SessionOrchestrator {
    conversations: Arc<dyn ConversationRepository>,
    relationships: Arc<dyn RelationshipRepository>,
    quota: QuotaTracker,
    context_builder: ContextBuilder,
    activity: Arc<ActivitySignalReader>,
    insights: InsightEngine,
    llm: Option<Arc<dyn CompletionProvider>>,
    clock: Arc<dyn Clock>,
    settings: OrchestratorSettings,
}

impl SessionOrchestrator {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        usage: Arc<dyn UsageStore>,
        relationships: Arc<dyn RelationshipRepository>,
        llm: Option<Arc<dyn CompletionProvider>>,
        clock: Arc<dyn Clock>,
        settings: OrchestratorSettings,
    ) -> Self {
        let activity = Arc::new(ActivitySignalReader::new(relationships.clone()));

        Self {
            conversations,
            quota: QuotaTracker::new(usage, settings.weekly_limit),
            context_builder: ContextBuilder::new(relationships.clone(), activity.clone()),
            relationships,
            activity,
            insights: InsightEngine::new(),
            llm,
            clock,
            settings,
        }
    }

    pub fn llm_available(&self) -> bool {
        self.llm.is_some()
    }

    pub fn weekly_limit(&self) -> u32 {
        self.quota.weekly_limit()
    }

    pub async fn quota_status(&self, user: &UserProfile) -> Result<QuotaStatus, CoachError> {
        let messages_remaining = self
            .quota
            .get_remaining(&user.id, user.is_premium, self.clock.now())
            .await
            .map_err(CoachError::QuotaRead)?;

        Ok(QuotaStatus {
            messages_remaining,
            is_premium: user.is_premium,
        })
    }

    /// Resumes the latest fresh conversation, or computes an opener without
    /// creating anything. Never calls the LLM and never consumes quota.
    pub async fn start_or_resume(
        &self,
        user: &UserProfile,
        couple_id: &str,
    ) -> Result<SessionState, CoachError> {
        let couple_id = self.member_couple_id(user, couple_id).await?;
        let now = self.clock.now();

        if let Some(conversation) = self.conversations.find_resumable(&user.id, now).await? {
            tracing::debug!(user_id = %user.id, conversation_id = %conversation.id, "Resuming conversation");
            let messages = self
                .conversations
                .history(conversation.id, DISPLAY_MESSAGE_LIMIT)
                .await?;
            let quota = self.quota_status(user).await?;

            return Ok(SessionState::Resumed {
                conversation,
                messages,
                quota,
            });
        }

        tracing::debug!(user_id = %user.id, "No resumable conversation, starting fresh");
        Ok(SessionState::Started(self.build_opener(user, couple_id).await?))
    }

    /// Greeting built from the strongest activity signal, with the proactive
    /// insight (if any) appended.
    pub async fn opener(&self, user: &UserProfile, couple_id: &str) -> Result<Opener, CoachError> {
        let couple_id = self.member_couple_id(user, couple_id).await?;
        self.build_opener(user, couple_id).await
    }

    async fn build_opener(&self, user: &UserProfile, couple_id: &str) -> Result<Opener, CoachError> {
        let now = self.clock.now();

        let recent_activity = self.activity.recent_activity(&user.id, couple_id, now).await?;
        let flags = self
            .activity
            .concern_flags(&user.id, self.settings.concern_window_days, now)
            .await?;
        let proactive_prompt = self.insights.select_prompt(&flags);

        let user_name = user.display_name.clone();
        let mut opener = context_assembly::opener_text(&recent_activity, user_name.as_deref());
        if let Some(prompt) = &proactive_prompt {
            opener.push_str("\n\n");
            opener.push_str(&prompt.message);
        }

        Ok(Opener {
            opener,
            recent_activity,
            proactive_prompt,
            user_name,
            quota: self.quota_status(user).await?,
        })
    }

    pub async fn post_message(
        &self,
        user: &UserProfile,
        couple_id: &str,
        conversation_id: Option<Uuid>,
        content: &str,
    ) -> Result<PostMessageOutcome, CoachError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(CoachError::Validation("message is required".to_string()));
        }
        if content.chars().count() > MAX_MESSAGE_CHARS {
            return Err(CoachError::Validation(format!(
                "message must be at most {MAX_MESSAGE_CHARS} characters"
            )));
        }
        let couple_id = self.member_couple_id(user, couple_id).await?;

        // Checked before anything is written so an unconfigured coach leaves
        // no orphan conversations behind.
        let llm = self.llm.clone().ok_or(CoachError::LlmUnavailable)?;

        let now = self.clock.now();
        if !user.is_premium {
            let allowed = self
                .quota
                .check_limit(&user.id, now)
                .await
                .map_err(CoachError::QuotaRead)?;
            if !allowed {
                tracing::info!(user_id = %user.id, "Weekly message limit reached");
                return Err(CoachError::QuotaExceeded {
                    limit: self.quota.weekly_limit(),
                });
            }
        }

        let conversation = match conversation_id {
            Some(id) => {
                let existing = self.owned_conversation(user, id).await?;
                if existing.couple_id != couple_id {
                    return Err(CoachError::Validation(
                        "coupleId does not match the conversation".to_string(),
                    ));
                }
                if self.conversations.is_stale(&existing, now) {
                    // The stale conversation stays as it was; the reply goes to a new one.
                    tracing::debug!(conversation_id = %existing.id, "Supplied conversation is stale, starting a new one");
                    self.conversations
                        .create_conversation(&user.id, couple_id, now)
                        .await?
                } else {
                    existing
                }
            }
            None => {
                self.conversations
                    .create_conversation(&user.id, couple_id, now)
                    .await?
            }
        };

        self.conversations
            .append_message(conversation.id, MessageRole::User, content, now)
            .await
            .inspect_err(|e| tracing::error!(conversation_id = %conversation.id, "Failed to store user message: {}", e))?;

        let history = self
            .conversations
            .history(conversation.id, self.settings.history_window)
            .await?;
        let first_reply = !self
            .conversations
            .has_message_with_role(conversation.id, MessageRole::Assistant)
            .await?;

        let context = self.context_builder.build(&user.id, couple_id, now).await?;
        let system = context_assembly::system_prompt(&context, first_reply);

        let reply = llm.complete(&system, &history).await.inspect_err(|e| {
            tracing::error!(conversation_id = %conversation.id, "Coach reply failed: {}", e)
        })?;

        let message = self
            .conversations
            .append_message(conversation.id, MessageRole::Assistant, &reply, self.clock.now())
            .await
            .inspect_err(|e| tracing::error!(conversation_id = %conversation.id, "Failed to store coach reply: {}", e))?;

        let messages_remaining = if user.is_premium {
            None
        } else {
            match self.quota.commit(&user.id, self.clock.now()).await {
                Ok(count) => Some(self.quota.remaining_after(count)),
                Err(e) => {
                    tracing::warn!(user_id = %user.id, "Quota commit failed after reply: {}", e);
                    None
                }
            }
        };

        Ok(PostMessageOutcome {
            conversation_id: conversation.id,
            message,
            messages_remaining,
            is_premium: user.is_premium,
        })
    }

    pub async fn conversation_messages(
        &self,
        user: &UserProfile,
        conversation_id: Uuid,
    ) -> Result<ConversationMessages, CoachError> {
        let conversation = self.owned_conversation(user, conversation_id).await?;
        let messages = self
            .conversations
            .history(conversation.id, DISPLAY_MESSAGE_LIMIT)
            .await?;

        Ok(ConversationMessages {
            conversation,
            messages,
            quota: self.quota_status(user).await?,
        })
    }

    /// Most recently updated first.
    pub async fn list_conversations(
        &self,
        user: &UserProfile,
    ) -> Result<Vec<Conversation>, CoachError> {
        Ok(self
            .conversations
            .list_recent(&user.id, CONVERSATION_LIST_LIMIT)
            .await?)
    }

    async fn owned_conversation(
        &self,
        user: &UserProfile,
        conversation_id: Uuid,
    ) -> Result<Conversation, CoachError> {
        match self.conversations.find_by_id(conversation_id).await? {
            Some(conversation) if conversation.user_id == user.id => Ok(conversation),
            _ => Err(CoachError::NotFound("Conversation not found".to_string())),
        }
    }

    /// Trimmed couple id, provided the user belongs to that couple. Foreign
    /// and unknown couples look the same to the caller.
    async fn member_couple_id<'a>(
        &self,
        user: &UserProfile,
        couple_id: &'a str,
    ) -> Result<&'a str, CoachError> {
        let couple_id = require_couple_id(couple_id)?;
        if !self.relationships.is_member(&user.id, couple_id).await? {
            tracing::warn!(user_id = %user.id, couple_id, "Rejected couple the user does not belong to");
            return Err(CoachError::NotFound("Couple not found".to_string()));
        }
        Ok(couple_id)
    }
}

fn require_couple_id(couple_id: &str) -> Result<&str, CoachError> {
    let couple_id = couple_id.trim();
    if couple_id.is_empty() {
        return Err(CoachError::Validation("coupleId is required".to_string()));
    }
    Ok(couple_id)
}
