pub mod api_tokens;
pub mod check_ins;
pub mod conversations;
pub mod couples;
pub mod date_plans;
pub mod flirts;
pub mod health_scores;
pub mod messages;
pub mod users;
pub mod weekly_usage;
