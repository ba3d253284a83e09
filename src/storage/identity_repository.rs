use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{prelude::*, Set};
use uuid::Uuid;

use crate::auth::{hash_token, IdentityVerifier};
use crate::models::internal::UserProfile;
use crate::storage::entities::{api_tokens, users};
use crate::storage::repository::{to_db_timestamp, RepositoryError};

/// Identity backed by the local `api_tokens` table.
pub struct SeaOrmIdentityVerifier {
    db: DatabaseConnection,
}

impl SeaOrmIdentityVerifier {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Mints a bearer token for an existing user. The plaintext is returned
    /// once and never stored.
    pub async fn issue_token(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<String, RepositoryError> {
        if users::Entity::find_by_id(user_id.to_string())
            .one(&self.db)
            .await?
            .is_none()
        {
            return Err(RepositoryError::NotFound(format!("User {user_id}")));
        }

        let token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());

        api_tokens::ActiveModel {
            token_hash: Set(hash_token(&token)),
            user_id: Set(user_id.to_string()),
            created_at: Set(to_db_timestamp(now)),
        }
        .insert(&self.db)
        .await?;

        tracing::info!("Issued API token for user {}", user_id);
        Ok(token)
    }
}

#[async_trait]
impl IdentityVerifier for SeaOrmIdentityVerifier {
    async fn verify(&self, token: &str) -> Result<Option<UserProfile>, RepositoryError> {
        let Some(record) = api_tokens::Entity::find_by_id(hash_token(token))
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };

        let user = users::Entity::find_by_id(record.user_id)
            .one(&self.db)
            .await?;

        Ok(user.map(UserProfile::from))
    }
}
