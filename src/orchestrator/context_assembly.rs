use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::models::internal::{ActivitySignal, HealthSummary, HealthTrend, SignalKind};
use crate::orchestrator::activity_signals::{truncate_chars, ActivitySignalReader};
use crate::storage::relationship_repository::RelationshipRepository;
use crate::storage::repository::RepositoryError;

pub const DEFAULT_USER_NAME: &str = "the user";
pub const DEFAULT_PARTNER_NAME: &str = "their partner";

const MAX_NAME_CHARS: usize = 64;
const MAX_ACTIVITY_CHARS: usize = 280;
/// Minimum score movement between the last two readings to call a trend.
const TREND_DELTA: i32 = 5;

const COACH_PERSONA: &str = "You are a warm, practical relationship coach inside a couples app. \
You are talking one-on-one with one partner. Keep replies short (2-4 sentences), ask at most one \
question at a time, never take sides against the partner, and suggest concrete, small actions. \
If the user mentions self-harm or abuse, gently encourage them to contact local emergency \
services or a qualified professional.";

/// Bounded snapshot of who the user is and what is going on in the
/// relationship, fed into the system prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoachContext {
    pub user_name: Option<String>,
    pub partner_name: Option<String>,
    pub health: Option<HealthSummary>,
    pub recent_activity: ActivitySignal,
}

pub struct ContextBuilder {
    repo: Arc<dyn RelationshipRepository>,
    activity: Arc<ActivitySignalReader>,
}

impl ContextBuilder {
    pub fn new(repo: Arc<dyn RelationshipRepository>, activity: Arc<ActivitySignalReader>) -> Self {
        Self { repo, activity }
    }

    /// Missing pieces (no partner, no score yet) are left empty rather than
    /// failing; `render` substitutes neutral defaults.
    pub async fn build(
        &self,
        user_id: &str,
        couple_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CoachContext, RepositoryError> {
        let user_name = self
            .repo
            .find_user(user_id)
            .await?
            .and_then(|u| u.display_name)
            .map(|n| truncate_chars(n.trim(), MAX_NAME_CHARS));

        let partner_name = self
            .repo
            .find_partner(user_id, couple_id)
            .await?
            .and_then(|p| p.display_name)
            .map(|n| truncate_chars(n.trim(), MAX_NAME_CHARS));

        let scores = self.repo.latest_health_scores(couple_id, 2).await?;
        let health = scores.first().map(|latest| HealthSummary {
            score: latest.score,
            trend: scores.get(1).map(|previous| {
                let delta = latest.score - previous.score;
                if delta >= TREND_DELTA {
                    HealthTrend::Improving
                } else if delta <= -TREND_DELTA {
                    HealthTrend::Declining
                } else {
                    HealthTrend::Steady
                }
            }),
        });

        let recent_activity = self.activity.recent_activity(user_id, couple_id, now).await?;

        Ok(CoachContext {
            user_name,
            partner_name,
            health,
            recent_activity,
        })
    }
}

/// Deterministic: equal contexts always render to identical text.
pub fn render(context: &CoachContext) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "User: {}",
        context.user_name.as_deref().unwrap_or(DEFAULT_USER_NAME)
    );
    let _ = writeln!(
        out,
        "Partner: {}",
        context.partner_name.as_deref().unwrap_or(DEFAULT_PARTNER_NAME)
    );

    match &context.health {
        Some(health) => {
            let trend = match health.trend {
                Some(HealthTrend::Improving) => "improving",
                Some(HealthTrend::Declining) => "declining",
                Some(HealthTrend::Steady) => "steady",
                None => "no trend yet",
            };
            let _ = writeln!(out, "Relationship health: {}/100 ({})", health.score, trend);
        }
        None => {
            let _ = writeln!(out, "Relationship health: no score recorded yet");
        }
    }

    if context.recent_activity.is_none() {
        let _ = write!(out, "Recent activity: nothing notable");
    } else {
        let _ = write!(
            out,
            "Recent activity: {}",
            truncate_chars(&context.recent_activity.description, MAX_ACTIVITY_CHARS)
        );
    }

    out
}

/// Greeting for a fresh session, keyed on the activity signal.
pub fn opener_text(signal: &ActivitySignal, user_name: Option<&str>) -> String {
    let name = user_name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or("there");

    match signal.kind {
        SignalKind::CompletedDate => format!(
            "Hey {name}! {} How did it go? {}",
            signal.description, signal.suggested_action
        ),
        SignalKind::FlirtSent => format!(
            "Hi {name}! {} That's a lovely way to stay connected. {}",
            signal.description, signal.suggested_action
        ),
        SignalKind::LowHealth => format!(
            "Hi {name}. {} I'm here to help you two find your way back to each other. {}",
            signal.description, signal.suggested_action
        ),
        SignalKind::MissedCheckins => format!(
            "Welcome back, {name}! {} {}",
            signal.description, signal.suggested_action
        ),
        SignalKind::None => format!(
            "Hi {name}! I'm your relationship coach. What's on your mind today?"
        ),
    }
}

/// One-line mention of the activity signal for the first coached reply.
pub fn opener_mention(signal: &ActivitySignal) -> Option<String> {
    if signal.is_none() {
        return None;
    }
    Some(format!(
        "If it fits naturally, briefly acknowledge this once: {} (suggested next step: {})",
        truncate_chars(&signal.description, MAX_ACTIVITY_CHARS),
        truncate_chars(&signal.suggested_action, MAX_ACTIVITY_CHARS)
    ))
}

pub fn system_prompt(context: &CoachContext, first_reply: bool) -> String {
    let mut prompt = format!("{COACH_PERSONA}\n\n## Context\n{}", render(context));

    if first_reply {
        if let Some(mention) = opener_mention(&context.recent_activity) {
            prompt.push_str("\n\n## Opening note\n");
            prompt.push_str(&mention);
        }
    }

    prompt
}
