use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use sea_orm::{prelude::*, QueryOrder, QuerySelect, Set, TransactionTrait};
use uuid::Uuid;

use crate::models::internal::{Conversation, Message, MessageRole, SOLO_CONVERSATION_TYPE};
use crate::storage::entities::{conversations, messages};

/// Fixed-width so lexical order in SQLite matches chronological order.
const DB_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    DbError(#[from] sea_orm::DbErr),
    #[error("Entity not found: {0}")]
    NotFound(String),
    #[error("Corrupt row: {0}")]
    Corrupt(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub fn to_db_timestamp(at: DateTime<Utc>) -> String {
    at.naive_utc().format(DB_TIMESTAMP_FORMAT).to_string()
}

pub fn from_db_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    NaiveDateTime::parse_from_str(raw, DB_TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| RepositoryError::Corrupt(format!("timestamp '{raw}': {e}")))
}

fn parse_uuid(raw: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(raw).map_err(|e| RepositoryError::Corrupt(format!("uuid '{raw}': {e}")))
}

// ============================================
// TRAIT DEFINITION - with Send + Sync bounds
// ============================================
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Most recently updated solo conversation, unless it has gone stale.
    async fn find_resumable(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Conversation>, RepositoryError>;

    /// Always inserts a fresh row.
    async fn create_conversation(
        &self,
        user_id: &str,
        couple_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Conversation, RepositoryError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Conversation>, RepositoryError>;

    /// True once `now` is past the resume window measured from `updated_at`.
    /// The single staleness rule for every caller.
    fn is_stale(&self, conversation: &Conversation, now: DateTime<Utc>) -> bool;

    /// Appends and bumps the conversation's `updated_at` to `at`.
    async fn append_message(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
        content: &str,
        at: DateTime<Utc>,
    ) -> Result<Message, RepositoryError>;

    /// The most recent `limit` messages, oldest first.
    async fn history(
        &self,
        conversation_id: Uuid,
        limit: u64,
    ) -> Result<Vec<Message>, RepositoryError>;

    async fn list_recent(
        &self,
        user_id: &str,
        limit: u64,
    ) -> Result<Vec<Conversation>, RepositoryError>;

    async fn count_messages_in_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<u64, RepositoryError>;

    /// Whether any message with `role` exists, regardless of history limits.
    async fn has_message_with_role(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
    ) -> Result<bool, RepositoryError>;
}

// ============================================
// IMPLEMENTATION STRUCT
// ============================================
pub struct SeaOrmConversationRepository {
    db: DatabaseConnection,
    resume_window: Duration,
}

impl SeaOrmConversationRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self::with_resume_window(db, Duration::hours(crate::orchestrator::RESUME_WINDOW_HOURS))
    }

    pub fn with_resume_window(db: DatabaseConnection, resume_window: Duration) -> Self {
        Self { db, resume_window }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

// ============================================
// TRAIT IMPLEMENTATION
// ============================================
#[async_trait]
impl ConversationRepository for SeaOrmConversationRepository {
    async fn find_resumable(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let latest = conversations::Entity::find()
            .filter(conversations::Column::UserId.eq(user_id))
            .filter(conversations::Column::ConversationType.eq(SOLO_CONVERSATION_TYPE))
            .order_by_desc(conversations::Column::UpdatedAt)
            .one(&self.db)
            .await?;

        let Some(model) = latest else {
            return Ok(None);
        };

        let conversation = Conversation::try_from(model)?;
        if self.is_stale(&conversation, now) {
            tracing::debug!(
                conversation_id = %conversation.id,
                "Latest conversation is stale, not resuming"
            );
            return Ok(None);
        }

        Ok(Some(conversation))
    }

    async fn create_conversation(
        &self,
        user_id: &str,
        couple_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Conversation, RepositoryError> {
        let id = Uuid::new_v4();
        let stamp = to_db_timestamp(now);

        let conversation = conversations::ActiveModel {
            id: Set(id.to_string()),
            user_id: Set(user_id.to_string()),
            couple_id: Set(couple_id.to_string()),
            conversation_type: Set(SOLO_CONVERSATION_TYPE.to_string()),
            created_at: Set(stamp.clone()),
            updated_at: Set(stamp),
        };

        let model = conversation.insert(&self.db).await?;
        tracing::info!("Created conversation: {}", id);

        Conversation::try_from(model)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Conversation>, RepositoryError> {
        conversations::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .map(Conversation::try_from)
            .transpose()
    }

    fn is_stale(&self, conversation: &Conversation, now: DateTime<Utc>) -> bool {
        now - conversation.updated_at > self.resume_window
    }

    async fn append_message(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
        content: &str,
        at: DateTime<Utc>,
    ) -> Result<Message, RepositoryError> {
        // Insert and bump commit together or not at all.
        let txn = self.db.begin().await?;

        let conversation = conversations::Entity::find_by_id(conversation_id.to_string())
            .one(&txn)
            .await?
            .ok_or_else(|| RepositoryError::NotFound("Conversation not found".to_string()))?;

        let msg_id = Uuid::new_v4();
        let stamp = to_db_timestamp(at);

        let message = messages::ActiveModel {
            id: Set(msg_id.to_string()),
            conversation_id: Set(conversation_id.to_string()),
            role: Set(role.as_str().to_string()),
            content: Set(content.to_string()),
            created_at: Set(stamp.clone()),
            ..Default::default()
        };
        let stored = message.insert(&txn).await?;

        // updated_at never moves backwards, even if a caller's clock does.
        if stamp > conversation.updated_at {
            let mut active: conversations::ActiveModel = conversation.into();
            active.updated_at = Set(stamp);
            active.update(&txn).await?;
        }

        txn.commit().await?;

        tracing::debug!("Stored {} message: {}", role, msg_id);

        Message::try_from(stored)
    }

    async fn history(
        &self,
        conversation_id: Uuid,
        limit: u64,
    ) -> Result<Vec<Message>, RepositoryError> {
        let models = messages::Entity::find()
            .filter(messages::Column::ConversationId.eq(conversation_id.to_string()))
            .order_by_desc(messages::Column::CreatedAt)
            .order_by_desc(messages::Column::Seq)
            .limit(limit)
            .all(&self.db)
            .await?;

        // Take the tail, then hand it back in chronological order.
        let mut history = models
            .into_iter()
            .map(Message::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        history.reverse();

        Ok(history)
    }

    async fn list_recent(
        &self,
        user_id: &str,
        limit: u64,
    ) -> Result<Vec<Conversation>, RepositoryError> {
        conversations::Entity::find()
            .filter(conversations::Column::UserId.eq(user_id))
            .filter(conversations::Column::ConversationType.eq(SOLO_CONVERSATION_TYPE))
            .order_by_desc(conversations::Column::UpdatedAt)
            .limit(limit)
            .all(&self.db)
            .await?
            .into_iter()
            .map(Conversation::try_from)
            .collect()
    }

    async fn count_messages_in_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<u64, RepositoryError> {
        let count = messages::Entity::find()
            .filter(messages::Column::ConversationId.eq(conversation_id.to_string()))
            .count(&self.db)
            .await?;
        Ok(count)
    }

    async fn has_message_with_role(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
    ) -> Result<bool, RepositoryError> {
        let found = messages::Entity::find()
            .filter(messages::Column::ConversationId.eq(conversation_id.to_string()))
            .filter(messages::Column::Role.eq(role.as_str()))
            .one(&self.db)
            .await?;
        Ok(found.is_some())
    }
}

// ============================================
// Conversions
// ============================================

impl TryFrom<conversations::Model> for Conversation {
    type Error = RepositoryError;

    fn try_from(model: conversations::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id)?,
            user_id: model.user_id,
            couple_id: model.couple_id,
            conversation_type: model.conversation_type,
            created_at: from_db_timestamp(&model.created_at)?,
            updated_at: from_db_timestamp(&model.updated_at)?,
        })
    }
}

impl TryFrom<messages::Model> for Message {
    type Error = RepositoryError;

    fn try_from(model: messages::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id)?,
            conversation_id: parse_uuid(&model.conversation_id)?,
            role: model.role.parse().map_err(RepositoryError::Corrupt)?,
            content: model.content,
            created_at: from_db_timestamp(&model.created_at)?,
        })
    }
}
