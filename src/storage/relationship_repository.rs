use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{prelude::*, sea_query::OnConflict, Condition, QueryOrder, QuerySelect, Set};
use uuid::Uuid;

use crate::models::internal::{CheckIn, DatePlan, Flirt, HealthScore, UserProfile};
use crate::storage::entities::{check_ins, couples, date_plans, flirts, health_scores, users};
use crate::storage::repository::{from_db_timestamp, to_db_timestamp, RepositoryError};

/// Read side of the relationship features the coach draws context from.
#[async_trait]
pub trait RelationshipRepository: Send + Sync {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserProfile>, RepositoryError>;

    /// Whether `user_id` is one of the couple's two members.
    async fn is_member(&self, user_id: &str, couple_id: &str) -> Result<bool, RepositoryError>;

    /// The other member of the couple, if the couple has one.
    async fn find_partner(
        &self,
        user_id: &str,
        couple_id: &str,
    ) -> Result<Option<UserProfile>, RepositoryError>;

    /// Newest first.
    async fn latest_health_scores(
        &self,
        couple_id: &str,
        limit: u64,
    ) -> Result<Vec<HealthScore>, RepositoryError>;

    async fn latest_unreflected_date(
        &self,
        couple_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<DatePlan>, RepositoryError>;

    async fn latest_flirt_sent(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<Flirt>, RepositoryError>;

    async fn last_check_in_at(&self, user_id: &str)
        -> Result<Option<DateTime<Utc>>, RepositoryError>;

    /// Oldest first.
    async fn check_ins_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<CheckIn>, RepositoryError>;
}

pub struct SeaOrmRelationshipRepository {
    db: DatabaseConnection,
}

impl SeaOrmRelationshipRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    // ============================================
    // Writes used by the seed command and tests
    // ============================================

    pub async fn upsert_user(
        &self,
        user_id: &str,
        display_name: Option<&str>,
        is_premium: bool,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let user = users::ActiveModel {
            id: Set(user_id.to_string()),
            display_name: Set(display_name.map(str::to_string)),
            is_premium: Set(is_premium),
            created_at: Set(to_db_timestamp(now)),
        };

        users::Entity::insert(user)
            .on_conflict(
                OnConflict::column(users::Column::Id)
                    .update_columns([users::Column::DisplayName, users::Column::IsPremium])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    pub async fn create_couple(
        &self,
        couple_id: &str,
        user_a: &str,
        user_b: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let couple = couples::ActiveModel {
            id: Set(couple_id.to_string()),
            user_a: Set(user_a.to_string()),
            user_b: Set(user_b.map(str::to_string)),
            created_at: Set(to_db_timestamp(now)),
        };

        couples::Entity::insert(couple)
            .on_conflict(
                OnConflict::column(couples::Column::Id)
                    .update_columns([couples::Column::UserA, couples::Column::UserB])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    pub async fn record_health_score(
        &self,
        couple_id: &str,
        score: i32,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        if !(0..=100).contains(&score) {
            return Err(RepositoryError::InvalidInput(format!(
                "health score {score} outside 0..=100"
            )));
        }

        health_scores::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            couple_id: Set(couple_id.to_string()),
            score: Set(score),
            recorded_at: Set(to_db_timestamp(at)),
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }

    pub async fn record_date(
        &self,
        couple_id: &str,
        title: &str,
        completed_at: Option<DateTime<Utc>>,
        reflection: Option<&str>,
    ) -> Result<String, RepositoryError> {
        let id = Uuid::new_v4().to_string();
        let status = if completed_at.is_some() { "completed" } else { "planned" };

        date_plans::ActiveModel {
            id: Set(id.clone()),
            couple_id: Set(couple_id.to_string()),
            title: Set(title.to_string()),
            status: Set(status.to_string()),
            completed_at: Set(completed_at.map(to_db_timestamp)),
            reflection: Set(reflection.map(str::to_string)),
        }
        .insert(&self.db)
        .await?;
        Ok(id)
    }

    pub async fn record_flirt(
        &self,
        couple_id: &str,
        sender_id: &str,
        content: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        flirts::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            couple_id: Set(couple_id.to_string()),
            sender_id: Set(sender_id.to_string()),
            content: Set(content.to_string()),
            sent_at: Set(to_db_timestamp(at)),
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }

    pub async fn record_check_in(
        &self,
        user_id: &str,
        couple_id: &str,
        stress_level: i32,
        connection_score: i32,
        mood: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        if !(1..=5).contains(&stress_level) || !(1..=5).contains(&connection_score) {
            return Err(RepositoryError::InvalidInput(
                "check-in scores must be within 1..=5".to_string(),
            ));
        }

        check_ins::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            user_id: Set(user_id.to_string()),
            couple_id: Set(couple_id.to_string()),
            mood: Set(mood.map(str::to_string)),
            stress_level: Set(stress_level),
            connection_score: Set(connection_score),
            created_at: Set(to_db_timestamp(at)),
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RelationshipRepository for SeaOrmRelationshipRepository {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserProfile>, RepositoryError> {
        let model = users::Entity::find_by_id(user_id.to_string())
            .one(&self.db)
            .await?;

        Ok(model.map(UserProfile::from))
    }

    async fn is_member(&self, user_id: &str, couple_id: &str) -> Result<bool, RepositoryError> {
        let couple = couples::Entity::find_by_id(couple_id.to_string())
            .one(&self.db)
            .await?;

        Ok(couple.is_some_and(|c| c.user_a == user_id || c.user_b.as_deref() == Some(user_id)))
    }

    async fn find_partner(
        &self,
        user_id: &str,
        couple_id: &str,
    ) -> Result<Option<UserProfile>, RepositoryError> {
        let Some(couple) = couples::Entity::find_by_id(couple_id.to_string())
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };

        let partner_id = if couple.user_a == user_id {
            couple.user_b
        } else if couple.user_b.as_deref() == Some(user_id) {
            Some(couple.user_a)
        } else {
            tracing::warn!(couple_id, user_id, "User is not a member of the couple");
            None
        };

        match partner_id {
            Some(id) => self.find_user(&id).await,
            None => Ok(None),
        }
    }

    async fn latest_health_scores(
        &self,
        couple_id: &str,
        limit: u64,
    ) -> Result<Vec<HealthScore>, RepositoryError> {
        health_scores::Entity::find()
            .filter(health_scores::Column::CoupleId.eq(couple_id))
            .order_by_desc(health_scores::Column::RecordedAt)
            .limit(limit)
            .all(&self.db)
            .await?
            .into_iter()
            .map(|m| -> Result<HealthScore, RepositoryError> {
                Ok(HealthScore {
                    score: m.score,
                    recorded_at: from_db_timestamp(&m.recorded_at)?,
                })
            })
            .collect()
    }

    async fn latest_unreflected_date(
        &self,
        couple_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<DatePlan>, RepositoryError> {
        let model = date_plans::Entity::find()
            .filter(
                Condition::all()
                    .add(date_plans::Column::CoupleId.eq(couple_id))
                    .add(date_plans::Column::Status.eq("completed"))
                    .add(date_plans::Column::CompletedAt.gte(to_db_timestamp(since)))
                    .add(date_plans::Column::Reflection.is_null()),
            )
            .order_by_desc(date_plans::Column::CompletedAt)
            .one(&self.db)
            .await?;

        model.map(DatePlan::try_from).transpose()
    }

    async fn latest_flirt_sent(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<Flirt>, RepositoryError> {
        let model = flirts::Entity::find()
            .filter(flirts::Column::SenderId.eq(user_id))
            .filter(flirts::Column::SentAt.gte(to_db_timestamp(since)))
            .order_by_desc(flirts::Column::SentAt)
            .one(&self.db)
            .await?;

        model.map(Flirt::try_from).transpose()
    }

    async fn last_check_in_at(
        &self,
        user_id: &str,
    ) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        let latest = check_ins::Entity::find()
            .filter(check_ins::Column::UserId.eq(user_id))
            .order_by_desc(check_ins::Column::CreatedAt)
            .one(&self.db)
            .await?;

        latest
            .map(|m| from_db_timestamp(&m.created_at))
            .transpose()
    }

    async fn check_ins_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<CheckIn>, RepositoryError> {
        check_ins::Entity::find()
            .filter(check_ins::Column::UserId.eq(user_id))
            .filter(check_ins::Column::CreatedAt.gte(to_db_timestamp(since)))
            .order_by_asc(check_ins::Column::CreatedAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(CheckIn::try_from)
            .collect()
    }
}

// ============================================
// Conversions
// ============================================

impl From<users::Model> for UserProfile {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            display_name: model.display_name.filter(|n| !n.trim().is_empty()),
            is_premium: model.is_premium,
        }
    }
}

impl TryFrom<date_plans::Model> for DatePlan {
    type Error = RepositoryError;

    fn try_from(model: date_plans::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            couple_id: model.couple_id,
            title: model.title,
            completed_at: model
                .completed_at
                .as_deref()
                .map(from_db_timestamp)
                .transpose()?,
        })
    }
}

impl TryFrom<flirts::Model> for Flirt {
    type Error = RepositoryError;

    fn try_from(model: flirts::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            sender_id: model.sender_id,
            content: model.content,
            sent_at: from_db_timestamp(&model.sent_at)?,
        })
    }
}

impl TryFrom<check_ins::Model> for CheckIn {
    type Error = RepositoryError;

    fn try_from(model: check_ins::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            user_id: model.user_id,
            couple_id: model.couple_id,
            mood: model.mood,
            stress_level: model.stress_level,
            connection_score: model.connection_score,
            created_at: from_db_timestamp(&model.created_at)?,
        })
    }
}
