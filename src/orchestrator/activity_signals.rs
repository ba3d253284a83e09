use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::models::internal::{ActivitySignal, ConcernFlag, SignalKind};
use crate::orchestrator::pattern_analysis::analyze_check_ins;
use crate::storage::relationship_repository::RelationshipRepository;
use crate::storage::repository::RepositoryError;

/// Completed dates older than this no longer prompt a reflection.
pub const COMPLETED_DATE_LOOKBACK_DAYS: i64 = 7;
pub const FLIRT_LOOKBACK_HOURS: i64 = 48;
/// Health scores run 0..=100.
pub const LOW_HEALTH_THRESHOLD: i32 = 50;
pub const MISSED_CHECKIN_DAYS: i64 = 3;

const MAX_TITLE_CHARS: usize = 80;

/// Derives the single most relevant recent-activity signal and the
/// check-in concern flags for a user.
pub struct ActivitySignalReader {
    repo: Arc<dyn RelationshipRepository>,
}

impl ActivitySignalReader {
    pub fn new(repo: Arc<dyn RelationshipRepository>) -> Self {
        Self { repo }
    }

    /// Priority: unreflected completed date, recent flirt, low health, missed
    /// check-ins. First match wins.
    pub async fn recent_activity(
        &self,
        user_id: &str,
        couple_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ActivitySignal, RepositoryError> {
        if let Some(date) = self
            .repo
            .latest_unreflected_date(couple_id, now - Duration::days(COMPLETED_DATE_LOOKBACK_DAYS))
            .await?
        {
            return Ok(ActivitySignal {
                kind: SignalKind::CompletedDate,
                description: format!(
                    "You recently completed a date together: \"{}\".",
                    truncate_chars(&date.title, MAX_TITLE_CHARS)
                ),
                suggested_action: "Take a moment to reflect on how it went and what you'd like to do again."
                    .to_string(),
            });
        }

        if self
            .repo
            .latest_flirt_sent(user_id, now - Duration::hours(FLIRT_LOOKBACK_HOURS))
            .await?
            .is_some()
        {
            return Ok(ActivitySignal {
                kind: SignalKind::FlirtSent,
                description: "You sent your partner a sweet message recently.".to_string(),
                suggested_action: "Keep the momentum going with a small gesture of appreciation today."
                    .to_string(),
            });
        }

        if let Some(latest) = self.repo.latest_health_scores(couple_id, 1).await?.first() {
            if latest.score < LOW_HEALTH_THRESHOLD {
                return Ok(ActivitySignal {
                    kind: SignalKind::LowHealth,
                    description: format!(
                        "Your relationship health score is {} right now, which is on the low side.",
                        latest.score
                    ),
                    suggested_action: "Let's talk about what's been feeling hard and one small step to reconnect."
                        .to_string(),
                });
            }
        }

        if let Some(last) = self.repo.last_check_in_at(user_id).await? {
            let days = (now - last).num_days();
            if days >= MISSED_CHECKIN_DAYS {
                return Ok(ActivitySignal {
                    kind: SignalKind::MissedCheckins,
                    description: format!("It's been {days} days since your last check-in."),
                    suggested_action: "A quick check-in with your partner today can help you stay in sync."
                        .to_string(),
                });
            }
        }

        Ok(ActivitySignal::none())
    }

    pub async fn concern_flags(
        &self,
        user_id: &str,
        window_days: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<ConcernFlag>, RepositoryError> {
        let check_ins = self
            .repo
            .check_ins_since(user_id, now - Duration::days(window_days))
            .await?;

        Ok(analyze_check_ins(&check_ins))
    }
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}
