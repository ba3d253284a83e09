use async_trait::async_trait;
use chrono::NaiveDate;
use sea_orm::{prelude::*, DbBackend, Statement};

use crate::storage::entities::weekly_usage;
use crate::storage::repository::RepositoryError;

pub const WEEK_KEY_FORMAT: &str = "%Y-%m-%d";

/// Counter primitives for the weekly usage row. All coordination happens in
/// the database; implementations must never read-modify-write from the client.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Zero when no row exists yet for the week.
    async fn current_count(&self, user_id: &str, week_start: NaiveDate)
        -> Result<i64, RepositoryError>;

    /// Inserts the row with a count of 1. `Ok(false)` when the row already exists.
    async fn insert_initial(&self, user_id: &str, week_start: NaiveDate)
        -> Result<bool, RepositoryError>;

    /// Server-side `count = count + 1`, returning the stored value, or `None`
    /// if there is no row to increment.
    async fn increment(&self, user_id: &str, week_start: NaiveDate)
        -> Result<Option<i64>, RepositoryError>;
}

pub struct SeaOrmUsageStore {
    db: DatabaseConnection,
}

impl SeaOrmUsageStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn week_key(week_start: NaiveDate) -> String {
    week_start.format(WEEK_KEY_FORMAT).to_string()
}

#[async_trait]
impl UsageStore for SeaOrmUsageStore {
    async fn current_count(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<i64, RepositoryError> {
        let row = weekly_usage::Entity::find_by_id((user_id.to_string(), week_key(week_start)))
            .one(&self.db)
            .await?;

        Ok(row.map(|r| r.message_count).unwrap_or(0))
    }

    async fn insert_initial(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<bool, RepositoryError> {
        let result = self
            .db
            .execute(Statement::from_sql_and_values(
                DbBackend::Sqlite,
                r#"
                INSERT INTO weekly_usage (user_id, week_start, message_count)
                VALUES (?, ?, 1)
                ON CONFLICT (user_id, week_start) DO NOTHING
                "#,
                [user_id.into(), week_key(week_start).into()],
            ))
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn increment(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<Option<i64>, RepositoryError> {
        let row = self
            .db
            .query_one(Statement::from_sql_and_values(
                DbBackend::Sqlite,
                r#"
                UPDATE weekly_usage
                SET message_count = message_count + 1
                WHERE user_id = ? AND week_start = ?
                RETURNING message_count
                "#,
                [user_id.into(), week_key(week_start).into()],
            ))
            .await?;

        row.map(|r| r.try_get::<i64>("", "message_count"))
            .transpose()
            .map_err(RepositoryError::from)
    }
}
