use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use std::sync::Arc;

use crate::storage::repository::RepositoryError;
use crate::storage::usage_repository::UsageStore;

#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    #[error("Failed to read weekly usage: {0}")]
    Read(#[source] RepositoryError),
    #[error("Failed to persist weekly usage: {0}")]
    Persistence(#[source] RepositoryError),
    #[error("Weekly usage row vanished between insert and increment")]
    MissingCounter,
}

/// Monday (UTC) of the ISO week containing `now`.
pub fn week_start(now: DateTime<Utc>) -> NaiveDate {
    let today = now.date_naive();
    today - Duration::days(i64::from(today.weekday().num_days_from_monday()))
}

/// Owns the "at most N free messages per ISO week" budget.
///
/// `check_limit` is advisory: the increment only happens in `commit`, after a
/// reply was produced, so two racing requests can both pass the check and
/// overshoot the cap slightly. Users are never charged for failed replies.
pub struct QuotaTracker {
    store: Arc<dyn UsageStore>,
    weekly_limit: u32,
}

impl QuotaTracker {
    pub fn new(store: Arc<dyn UsageStore>, weekly_limit: u32) -> Self {
        Self {
            store,
            weekly_limit,
        }
    }

    pub fn weekly_limit(&self) -> u32 {
        self.weekly_limit
    }

    /// `None` means unlimited.
    pub async fn get_remaining(
        &self,
        user_id: &str,
        is_premium: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<u32>, QuotaError> {
        if is_premium {
            return Ok(None);
        }

        let count = self.current_count(user_id, now).await?;
        Ok(Some(self.remaining_after(count)))
    }

    pub async fn check_limit(&self, user_id: &str, now: DateTime<Utc>) -> Result<bool, QuotaError> {
        let count = self.current_count(user_id, now).await?;
        Ok(count < i64::from(self.weekly_limit))
    }

    /// Durably counts one coached reply and returns the stored post-increment
    /// value.
    pub async fn commit(&self, user_id: &str, now: DateTime<Utc>) -> Result<i64, QuotaError> {
        let week = week_start(now);

        match self.store.insert_initial(user_id, week).await {
            Ok(true) => {
                tracing::debug!(user_id, %week, "Started weekly usage counter");
                return Ok(1);
            }
            Ok(false) => {}
            Err(e) => {
                // The row may still exist; the increment below decides.
                tracing::warn!(user_id, %week, "Usage insert failed, falling back to increment: {}", e);
            }
        }

        match self.store.increment(user_id, week).await {
            Ok(Some(count)) => Ok(count),
            Ok(None) => Err(QuotaError::MissingCounter),
            Err(e) => Err(QuotaError::Persistence(e)),
        }
    }

    pub fn remaining_after(&self, count: i64) -> u32 {
        let remaining = i64::from(self.weekly_limit) - count;
        u32::try_from(remaining.max(0)).unwrap_or(0)
    }

    async fn current_count(&self, user_id: &str, now: DateTime<Utc>) -> Result<i64, QuotaError> {
        self.store
            .current_count(user_id, week_start(now))
            .await
            .map_err(QuotaError::Read)
    }
}
