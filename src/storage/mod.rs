pub mod db;
pub mod entities;
pub mod identity_repository;
pub mod relationship_repository;
pub mod repository;
pub mod usage_repository;

pub use db::{init_db, init_db_with_pool};
pub use identity_repository::SeaOrmIdentityVerifier;
pub use relationship_repository::{RelationshipRepository, SeaOrmRelationshipRepository};
pub use repository::{ConversationRepository, RepositoryError, SeaOrmConversationRepository};
pub use usage_repository::{SeaOrmUsageStore, UsageStore};
