//! Store semantics against a temporary SQLite database: conversation
//! lifecycle, role gating, two-party uniqueness, read-state idempotence.

use tradewire_server::db::models::{MessageKind, TradeRole, User};
use tradewire_server::error::ChatError;
use tradewire_server::store::users::role_communication_allowed;
use tradewire_server::store::MessageStore;

fn test_store() -> (MessageStore, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("Failed to create temp dir");
    let db = tradewire_server::db::init_db(tmp.path().to_str().unwrap()).expect("Failed to init DB");
    (MessageStore::new(db), tmp)
}

async fn seed_pair(store: &MessageStore) -> (User, User) {
    let retailer = store
        .create_user("Asha Retail", TradeRole::Retailer)
        .await
        .unwrap();
    let wholesaler = store
        .create_user("Bulk Goods Co", TradeRole::Wholesaler)
        .await
        .unwrap();
    (retailer, wholesaler)
}

#[test]
fn role_matrix_is_what_the_marketplace_allows() {
    use TradeRole::*;
    assert!(role_communication_allowed(Retailer, Wholesaler));
    assert!(role_communication_allowed(Wholesaler, Supplier));
    assert!(role_communication_allowed(Transporter, Retailer));
    assert!(role_communication_allowed(Supplier, Transporter));
    assert!(!role_communication_allowed(Retailer, Supplier));
    assert!(!role_communication_allowed(Retailer, Retailer));
    assert!(!role_communication_allowed(Supplier, Supplier));
}

#[tokio::test]
async fn open_conversation_is_unique_per_pair() {
    let (store, _tmp) = test_store();
    let (u1, u2) = seed_pair(&store).await;

    let first = store.open_conversation(&u1.id, &u2.id).await.unwrap();
    // Opening from the other side must return the same conversation.
    let second = store.open_conversation(&u2.id, &u1.id).await.unwrap();
    assert_eq!(first.id, second.id);

    let mut expected = vec![u1.id.clone(), u2.id.clone()];
    expected.sort();
    assert_eq!(first.participant_ids, expected);

    let found = store
        .find_conversation_between(&u1.id, &u2.id)
        .await
        .unwrap()
        .expect("conversation should be findable by participant pair");
    assert_eq!(found.id, first.id);
}

#[tokio::test]
async fn open_conversation_refuses_forbidden_role_pairs() {
    let (store, _tmp) = test_store();
    let retailer = store
        .create_user("Corner Shop", TradeRole::Retailer)
        .await
        .unwrap();
    let supplier = store
        .create_user("Raw Materials Ltd", TradeRole::Supplier)
        .await
        .unwrap();

    let err = store
        .open_conversation(&retailer.id, &supplier.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Authorization(_)));

    // Refused creation left nothing behind.
    assert!(store
        .find_conversation_between(&retailer.id, &supplier.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn open_conversation_rejects_self_and_unknown_users() {
    let (store, _tmp) = test_store();
    let (u1, _) = seed_pair(&store).await;

    let err = store.open_conversation(&u1.id, &u1.id).await.unwrap_err();
    assert!(matches!(err, ChatError::Validation(_)));

    let err = store.open_conversation(&u1.id, "nope").await.unwrap_err();
    assert!(matches!(err, ChatError::NotFound(_)));
}

#[tokio::test]
async fn mark_read_is_idempotent_and_never_includes_the_sender() {
    let (store, _tmp) = test_store();
    let (u1, u2) = seed_pair(&store).await;
    let conversation = store.open_conversation(&u1.id, &u2.id).await.unwrap();

    let message = store
        .create_message(&conversation.id, &u1, "hello", MessageKind::Text, None)
        .await
        .unwrap();
    assert!(message.read_by.is_empty());

    // Reader marks twice; the set still holds exactly one occurrence.
    store
        .mark_conversation_read(&conversation.id, &u2.id)
        .await
        .unwrap();
    store
        .mark_conversation_read(&conversation.id, &u2.id)
        .await
        .unwrap();
    let reloaded = store.message(&message.id).await.unwrap().unwrap();
    assert_eq!(reloaded.read_by, vec![u2.id.clone()]);

    // The sender marking their own conversation read never lands in their
    // own message's read set.
    store
        .mark_conversation_read(&conversation.id, &u1.id)
        .await
        .unwrap();
    let reloaded = store.message(&message.id).await.unwrap().unwrap();
    assert_eq!(reloaded.read_by, vec![u2.id.clone()]);
}

#[tokio::test]
async fn summary_update_feeds_conversation_ordering() {
    let (store, _tmp) = test_store();
    let (u1, u2) = seed_pair(&store).await;
    let transporter = store
        .create_user("Swift Haulage", TradeRole::Transporter)
        .await
        .unwrap();

    let quiet = store.open_conversation(&u1.id, &u2.id).await.unwrap();
    let active = store
        .open_conversation(&u1.id, &transporter.id)
        .await
        .unwrap();

    store
        .update_conversation_summary(&active.id, "pickup at 9am", "2026-08-26T10:00:00+00:00")
        .await
        .unwrap();

    let listed = store.conversations_for_user(&u1.id).await.unwrap();
    assert_eq!(listed.len(), 2);
    // Most recently active first, never-active conversations last.
    assert_eq!(listed[0].id, active.id);
    assert_eq!(listed[0].last_message_preview, "pickup at 9am");
    assert_eq!(listed[1].id, quiet.id);

    let err = store
        .update_conversation_summary("missing", "x", "2026-08-26T10:00:00+00:00")
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::NotFound(_)));
}

#[tokio::test]
async fn leaving_shrinks_then_deletes_with_cascade() {
    let (store, _tmp) = test_store();
    let (u1, u2) = seed_pair(&store).await;
    let conversation = store.open_conversation(&u1.id, &u2.id).await.unwrap();
    let message = store
        .create_message(&conversation.id, &u1, "bye", MessageKind::Text, None)
        .await
        .unwrap();

    store
        .leave_conversation(&conversation.id, &u1.id)
        .await
        .unwrap();
    let shrunk = store.conversation(&conversation.id).await.unwrap().unwrap();
    assert_eq!(shrunk.participant_ids, vec![u2.id.clone()]);

    store
        .leave_conversation(&conversation.id, &u2.id)
        .await
        .unwrap();
    // Empty participant set: the conversation and its messages are gone.
    assert!(store.conversation(&conversation.id).await.unwrap().is_none());
    assert!(store.message(&message.id).await.unwrap().is_none());
}

#[tokio::test]
async fn presence_flag_is_persisted_with_last_seen() {
    let (store, _tmp) = test_store();
    let (u1, _) = seed_pair(&store).await;
    assert!(!u1.online);

    store
        .set_user_presence(&u1.id, true, "2026-08-26T10:00:00+00:00")
        .await
        .unwrap();
    let user = store.find_user(&u1.id).await.unwrap().unwrap();
    assert!(user.online);
    assert_eq!(user.last_seen_at.as_deref(), Some("2026-08-26T10:00:00+00:00"));

    let err = store
        .set_user_presence("missing", true, "2026-08-26T10:00:00+00:00")
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::NotFound(_)));
}
