use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// The only conversation type served by the coach.
pub const SOLO_CONVERSATION_TYPE: &str = "solo";

/// Identity as resolved from a bearer credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: Option<String>,
    pub is_premium: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: String,
    pub couple_id: String,
    pub conversation_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(format!("unknown message role '{other}'")),
        }
    }
}

/// Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// ==================== Activity ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    CompletedDate,
    FlirtSent,
    LowHealth,
    MissedCheckins,
    None,
}

/// Derived view of the most relevant recent activity; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySignal {
    #[serde(rename = "type")]
    pub kind: SignalKind,
    pub description: String,
    pub suggested_action: String,
}

impl ActivitySignal {
    pub fn none() -> Self {
        Self {
            kind: SignalKind::None,
            description: String::new(),
            suggested_action: String::new(),
        }
    }

    pub fn is_none(&self) -> bool {
        self.kind == SignalKind::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConcernType {
    ConsecutiveStress,
    LowConnection,
    ConnectionDrop,
    LowEngagement,
    /// Produced by a newer pattern analyzer than this build knows about.
    #[serde(other)]
    Unrecognized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ConcernFlag {
    #[serde(rename = "type")]
    pub concern: ConcernType,
    pub severity: Severity,
}

impl ConcernFlag {
    pub fn new(concern: ConcernType, severity: Severity) -> Self {
        Self { concern, severity }
    }
}

/// At most one of these is surfaced per session start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProactivePrompt {
    pub concern: ConcernType,
    pub message: String,
}

// ==================== Relationship data ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthTrend {
    Improving,
    Declining,
    Steady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthSummary {
    pub score: i32,
    pub trend: Option<HealthTrend>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthScore {
    pub score: i32,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatePlan {
    pub id: String,
    pub couple_id: String,
    pub title: String,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flirt {
    pub id: String,
    pub sender_id: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckIn {
    pub id: String,
    pub user_id: String,
    pub couple_id: String,
    pub mood: Option<String>,
    pub stress_level: i32,
    pub connection_score: i32,
    pub created_at: DateTime<Utc>,
}
