// tests/integration/repository.rs
use super::{start_time, TestEnv, COUPLE_ID, PARTNER_ID, USER_ID};
use chrono::{Duration, NaiveDate};
use coach_controller::auth::IdentityVerifier;
use coach_controller::models::internal::MessageRole;
use coach_controller::storage::{ConversationRepository, RelationshipRepository, UsageStore};
use sea_orm::ConnectionTrait;

#[tokio::test]
async fn test_history_returns_most_recent_in_ascending_order() {
    let env = TestEnv::new().await;
    let now = start_time();
    let conv = env
        .conversations
        .create_conversation(USER_ID, COUPLE_ID, now)
        .await
        .unwrap();

    for i in 0..25 {
        env.conversations
            .append_message(
                conv.id,
                MessageRole::User,
                &format!("message {i}"),
                now + Duration::seconds(i),
            )
            .await
            .unwrap();
    }

    let history = env.conversations.history(conv.id, 20).await.unwrap();
    assert_eq!(history.len(), 20);
    assert_eq!(history.first().unwrap().content, "message 5");
    assert_eq!(history.last().unwrap().content, "message 24");
    assert!(history.windows(2).all(|w| w[0].created_at <= w[1].created_at));
}

#[tokio::test]
async fn test_identical_timestamps_keep_insertion_order() {
    let env = TestEnv::new().await;
    let now = start_time();
    let conv = env
        .conversations
        .create_conversation(USER_ID, COUPLE_ID, now)
        .await
        .unwrap();

    for content in ["first", "second", "third"] {
        env.conversations
            .append_message(conv.id, MessageRole::User, content, now)
            .await
            .unwrap();
    }

    let contents: Vec<String> = env
        .conversations
        .history(conv.id, 10)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(contents, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_append_bumps_updated_at_monotonically() {
    let env = TestEnv::new().await;
    let now = start_time();
    let conv = env
        .conversations
        .create_conversation(USER_ID, COUPLE_ID, now)
        .await
        .unwrap();

    let later = now + Duration::minutes(10);
    env.conversations
        .append_message(conv.id, MessageRole::User, "hi", later)
        .await
        .unwrap();
    // A message stamped earlier must not move updated_at back.
    env.conversations
        .append_message(conv.id, MessageRole::Assistant, "hello", now)
        .await
        .unwrap();

    let stored = env.conversations.find_by_id(conv.id).await.unwrap().unwrap();
    assert_eq!(stored.updated_at, later);
    assert_eq!(
        env.conversations
            .count_messages_in_conversation(conv.id)
            .await
            .unwrap(),
        2
    );
}

#[tokio::test]
async fn test_failed_bump_rolls_back_the_message() {
    let env = TestEnv::new().await;
    let now = start_time();
    let conv = env
        .conversations
        .create_conversation(USER_ID, COUPLE_ID, now)
        .await
        .unwrap();

    env.db
        .execute_unprepared(
            "CREATE TRIGGER block_conversation_bump BEFORE UPDATE ON conversations \
             BEGIN SELECT RAISE(ABORT, 'bump blocked'); END;",
        )
        .await
        .unwrap();

    let result = env
        .conversations
        .append_message(conv.id, MessageRole::User, "lost?", now + Duration::minutes(1))
        .await;
    assert!(result.is_err());
    assert_eq!(
        env.conversations
            .count_messages_in_conversation(conv.id)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_has_message_with_role_ignores_history_limits() {
    let env = TestEnv::new().await;
    let now = start_time();
    let conv = env
        .conversations
        .create_conversation(USER_ID, COUPLE_ID, now)
        .await
        .unwrap();

    assert!(!env
        .conversations
        .has_message_with_role(conv.id, MessageRole::Assistant)
        .await
        .unwrap());

    env.conversations
        .append_message(conv.id, MessageRole::Assistant, "welcome", now)
        .await
        .unwrap();
    for i in 0..30 {
        env.conversations
            .append_message(conv.id, MessageRole::User, "more", now + Duration::seconds(i + 1))
            .await
            .unwrap();
    }

    assert!(env
        .conversations
        .has_message_with_role(conv.id, MessageRole::Assistant)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_membership_covers_both_sides_only() {
    let env = TestEnv::new().await;
    env.seed_couple(false).await;

    assert!(env.relationships.is_member(USER_ID, COUPLE_ID).await.unwrap());
    assert!(env.relationships.is_member(PARTNER_ID, COUPLE_ID).await.unwrap());
    assert!(!env.relationships.is_member("stranger", COUPLE_ID).await.unwrap());
    assert!(!env.relationships.is_member(USER_ID, "missing").await.unwrap());
}

#[tokio::test]
async fn test_find_resumable_respects_window() {
    let env = TestEnv::new().await;
    let now = start_time();
    let conv = env
        .conversations
        .create_conversation(USER_ID, COUPLE_ID, now)
        .await
        .unwrap();

    let at_edge = now + Duration::hours(24);
    let resumable = env
        .conversations
        .find_resumable(USER_ID, at_edge)
        .await
        .unwrap();
    assert_eq!(resumable.map(|c| c.id), Some(conv.id));

    let past_edge = at_edge + Duration::seconds(1);
    assert!(env
        .conversations
        .find_resumable(USER_ID, past_edge)
        .await
        .unwrap()
        .is_none());

    // Left untouched, not deleted.
    let stored = env.conversations.find_by_id(conv.id).await.unwrap().unwrap();
    assert!(env.conversations.is_stale(&stored, past_edge));
    assert!(!env.conversations.is_stale(&stored, at_edge));
}

#[tokio::test]
async fn test_list_recent_orders_by_update_and_filters_owner() {
    let env = TestEnv::new().await;
    let now = start_time();

    let older = env
        .conversations
        .create_conversation(USER_ID, COUPLE_ID, now)
        .await
        .unwrap();
    let newer = env
        .conversations
        .create_conversation(USER_ID, COUPLE_ID, now + Duration::minutes(1))
        .await
        .unwrap();
    env.conversations
        .create_conversation(PARTNER_ID, COUPLE_ID, now)
        .await
        .unwrap();

    env.conversations
        .append_message(older.id, MessageRole::User, "bump", now + Duration::minutes(5))
        .await
        .unwrap();

    let ids: Vec<_> = env
        .conversations
        .list_recent(USER_ID, 20)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(ids, vec![older.id, newer.id]);
}

#[tokio::test]
async fn test_usage_store_insert_then_increment() {
    let env = TestEnv::new().await;
    let week = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();

    assert_eq!(env.usage.current_count(USER_ID, week).await.unwrap(), 0);
    assert_eq!(env.usage.increment(USER_ID, week).await.unwrap(), None);

    assert!(env.usage.insert_initial(USER_ID, week).await.unwrap());
    assert!(!env.usage.insert_initial(USER_ID, week).await.unwrap());
    assert_eq!(env.usage.increment(USER_ID, week).await.unwrap(), Some(2));
    assert_eq!(env.usage.current_count(USER_ID, week).await.unwrap(), 2);

    let next_week = week + Duration::days(7);
    assert_eq!(env.usage.current_count(USER_ID, next_week).await.unwrap(), 0);
}

#[tokio::test]
async fn test_partner_lookup_from_either_side() {
    let env = TestEnv::new().await;
    env.seed_couple(false).await;

    let partner = env
        .relationships
        .find_partner(USER_ID, COUPLE_ID)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(partner.id, PARTNER_ID);

    let partner = env
        .relationships
        .find_partner(PARTNER_ID, COUPLE_ID)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(partner.id, USER_ID);

    assert!(env
        .relationships
        .find_partner("stranger", COUPLE_ID)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_issued_token_verifies_and_is_not_stored_in_plaintext() {
    let env = TestEnv::new().await;
    env.seed_couple(true).await;

    let token = env.identity.issue_token(USER_ID, start_time()).await.unwrap();
    let user = env.identity.verify(&token).await.unwrap().unwrap();
    assert_eq!(user.id, USER_ID);
    assert!(user.is_premium);
    assert_eq!(user.display_name.as_deref(), Some("Sam"));

    assert!(env.identity.verify("not-a-token").await.unwrap().is_none());
    assert!(env.identity.issue_token("ghost", start_time()).await.is_err());
}

#[tokio::test]
async fn test_check_in_scores_are_validated() {
    let env = TestEnv::new().await;
    let result = env
        .relationships
        .record_check_in(USER_ID, COUPLE_ID, 6, 3, None, start_time())
        .await;
    assert!(result.is_err());

    assert!(env
        .relationships
        .record_health_score(COUPLE_ID, 101, start_time())
        .await
        .is_err());
}
