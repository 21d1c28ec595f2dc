//! Integration tests for the SurrealDB storage back-end.

use chrono::{Duration, Utc};
use duouniversal_core::error::DuoError;
use duouniversal_core::models::correlation::{CORRELATION_KIND, CorrelationEntry, Nonce};
use duouniversal_core::models::state::{STATE_STAGE, SuspendedState};
use duouniversal_core::repository::{KeyValueStore, SessionFlagStore, StateRepository};
use duouniversal_db::repository::{
    SurrealKeyValueStore, SurrealSessionFlagStore, SurrealStateRepository,
};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};

async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    duouniversal_db::run_migrations(&db).await.unwrap();
    db
}

// ---------------------------------------------------------------------------
// Key-value store
// ---------------------------------------------------------------------------

#[tokio::test]
async fn kv_set_then_get() {
    let store = SurrealKeyValueStore::new(setup().await);
    let entry = CorrelationEntry::new("duouniversal", &Nonce::new("n0nce"), "state-1", 300).unwrap();

    store
        .set(CORRELATION_KIND, &entry.key, &entry.state_id, entry.expires_at)
        .await
        .unwrap();

    assert_eq!(
        store.get(CORRELATION_KIND, "duouniversal:n0nce").await.unwrap(),
        Some("state-1".to_string())
    );
    assert_eq!(store.get("other", "duouniversal:n0nce").await.unwrap(), None);
}

#[tokio::test]
async fn kv_set_replaces_previous_value() {
    let store = SurrealKeyValueStore::new(setup().await);
    let expires = Utc::now() + Duration::seconds(300);

    store.set("string", "p:k", "first", expires).await.unwrap();
    store.set("string", "p:k", "second", expires).await.unwrap();

    assert_eq!(
        store.get("string", "p:k").await.unwrap().as_deref(),
        Some("second")
    );
}

#[tokio::test]
async fn kv_expired_entry_is_not_returned() {
    let store = SurrealKeyValueStore::new(setup().await);

    store
        .set("string", "p:old", "state-1", Utc::now() - Duration::seconds(1))
        .await
        .unwrap();

    assert_eq!(store.get("string", "p:old").await.unwrap(), None);
}

#[tokio::test]
async fn kv_delete_removes_entry() {
    let store = SurrealKeyValueStore::new(setup().await);
    let expires = Utc::now() + Duration::seconds(300);
    store.set("string", "p:k", "v", expires).await.unwrap();

    store.delete("string", "p:k").await.unwrap();
    store.delete("string", "p:k").await.unwrap();

    assert_eq!(store.get("string", "p:k").await.unwrap(), None);
}

#[tokio::test]
async fn kv_take_returns_value_once() {
    let store = SurrealKeyValueStore::new(setup().await);
    let expires = Utc::now() + Duration::seconds(300);
    store.set("string", "p:n", "state-1", expires).await.unwrap();

    assert_eq!(
        store.take("string", "p:n").await.unwrap().as_deref(),
        Some("state-1")
    );
    assert_eq!(store.take("string", "p:n").await.unwrap(), None);
    assert_eq!(store.get("string", "p:n").await.unwrap(), None);
}

#[tokio::test]
async fn kv_take_ignores_expired_entry() {
    let store = SurrealKeyValueStore::new(setup().await);
    store
        .set("string", "p:old", "state-1", Utc::now() - Duration::seconds(1))
        .await
        .unwrap();

    assert_eq!(store.take("string", "p:old").await.unwrap(), None);
    assert_eq!(store.cleanup_expired().await.unwrap(), 1);
}

#[tokio::test]
async fn kv_concurrent_takes_yield_one_value() {
    let store = SurrealKeyValueStore::new(setup().await);
    let expires = Utc::now() + Duration::seconds(300);
    store.set("string", "p:n", "state-1", expires).await.unwrap();

    let (a, b) = tokio::join!(store.take("string", "p:n"), store.take("string", "p:n"));
    let taken: Vec<String> = [a.unwrap(), b.unwrap()].into_iter().flatten().collect();

    assert_eq!(taken, vec!["state-1".to_string()]);
}

#[tokio::test]
async fn kv_cleanup_removes_only_expired() {
    let store = SurrealKeyValueStore::new(setup().await);
    let now = Utc::now();
    store
        .set("string", "p:a", "1", now - Duration::seconds(10))
        .await
        .unwrap();
    store
        .set("string", "p:b", "2", now - Duration::seconds(5))
        .await
        .unwrap();
    store
        .set("string", "p:c", "3", now + Duration::seconds(300))
        .await
        .unwrap();

    assert_eq!(store.cleanup_expired().await.unwrap(), 2);
    assert_eq!(store.get("string", "p:c").await.unwrap().as_deref(), Some("3"));
    assert_eq!(store.cleanup_expired().await.unwrap(), 0);
}

// ---------------------------------------------------------------------------
// State repository
// ---------------------------------------------------------------------------

#[tokio::test]
async fn state_round_trip() {
    let repo = SurrealStateRepository::new(setup().await);
    let mut state = SuspendedState::new("https://sp.example/meta")
        .with_attribute("uid", ["alice"])
        .with_attribute("mail", ["alice@example.com", "a@example.com"]);
    state.duo_nonce = Some("n0nce".into());
    state.authn_instant = Some(Utc::now());

    let id = repo.save_state(&state, STATE_STAGE).await.unwrap();
    let loaded = repo.load_state(&id, STATE_STAGE).await.unwrap();

    assert_eq!(loaded, Some(state));
}

#[tokio::test]
async fn state_ids_are_unique() {
    let repo = SurrealStateRepository::new(setup().await);
    let state = SuspendedState::new("https://sp.example/meta");

    let a = repo.save_state(&state, STATE_STAGE).await.unwrap();
    let b = repo.save_state(&state, STATE_STAGE).await.unwrap();

    assert_ne!(a, b);
}

#[tokio::test]
async fn state_load_with_other_stage_finds_nothing() {
    let repo = SurrealStateRepository::new(setup().await);
    let state = SuspendedState::new("https://sp.example/meta");
    let id = repo.save_state(&state, STATE_STAGE).await.unwrap();

    assert_eq!(repo.load_state(&id, "other:stage").await.unwrap(), None);
    assert_eq!(
        repo.load_state("00000000-0000-0000-0000-000000000000", STATE_STAGE)
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn unreadable_state_is_a_store_error() {
    let db = setup().await;
    db.query("CREATE type::record('auth_state', 'broken') SET stage = $stage, payload = '{'")
        .bind(("stage", STATE_STAGE))
        .await
        .unwrap()
        .check()
        .unwrap();

    let repo = SurrealStateRepository::new(db);
    let err = repo.load_state("broken", STATE_STAGE).await.unwrap_err();

    assert!(matches!(err, DuoError::Store(_)));
}

// ---------------------------------------------------------------------------
// Session flags
// ---------------------------------------------------------------------------

#[tokio::test]
async fn session_flag_round_trip() {
    let flags = SurrealSessionFlagStore::new(setup().await);
    assert!(!flags.is_verified("session-1").await.unwrap());

    flags
        .mark_verified("session-1", Utc::now(), Utc::now() + Duration::hours(8))
        .await
        .unwrap();

    assert!(flags.is_verified("session-1").await.unwrap());
    assert!(!flags.is_verified("session-2").await.unwrap());
}

#[tokio::test]
async fn expired_session_flag_is_not_verified() {
    let flags = SurrealSessionFlagStore::new(setup().await);
    let now = Utc::now();

    flags
        .mark_verified("session-1", now - Duration::hours(9), now - Duration::hours(1))
        .await
        .unwrap();

    assert!(!flags.is_verified("session-1").await.unwrap());
    assert_eq!(flags.verified_at("session-1").await.unwrap(), None);
}

#[tokio::test]
async fn cleared_session_flag_is_not_verified() {
    let flags = SurrealSessionFlagStore::new(setup().await);
    flags
        .mark_verified("session-1", Utc::now(), Utc::now() + Duration::hours(8))
        .await
        .unwrap();

    flags.clear("session-1").await.unwrap();
    flags.clear("session-1").await.unwrap();

    assert!(!flags.is_verified("session-1").await.unwrap());
}

#[tokio::test]
async fn session_flag_cleanup_removes_only_expired() {
    let flags = SurrealSessionFlagStore::new(setup().await);
    let now = Utc::now();
    flags
        .mark_verified("old", now - Duration::hours(9), now - Duration::hours(1))
        .await
        .unwrap();
    flags
        .mark_verified("live", now, now + Duration::hours(8))
        .await
        .unwrap();

    assert_eq!(flags.cleanup_expired().await.unwrap(), 1);
    assert!(flags.is_verified("live").await.unwrap());
    assert_eq!(flags.cleanup_expired().await.unwrap(), 0);
}

#[tokio::test]
async fn session_flag_keeps_latest_timestamp() {
    let flags = SurrealSessionFlagStore::new(setup().await);
    let first = Utc::now() - Duration::minutes(5);
    let second = Utc::now();

    let expires = second + Duration::hours(8);

    flags.mark_verified("session-1", first, expires).await.unwrap();
    flags.mark_verified("session-1", second, expires).await.unwrap();

    let stored = flags.verified_at("session-1").await.unwrap().unwrap();
    assert!((stored - second).num_milliseconds().abs() < 1);
}
