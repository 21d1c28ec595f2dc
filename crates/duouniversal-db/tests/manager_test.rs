//! `DbManager` over the in-memory engine.

use chrono::{Duration, Utc};
use duouniversal_core::models::state::{STATE_STAGE, SuspendedState};
use duouniversal_core::repository::{KeyValueStore, SessionFlagStore, StateRepository};
use duouniversal_db::DbManager;
use surrealdb::Surreal;
use surrealdb::engine::local::Mem;

#[tokio::test]
async fn manager_migrates_and_hands_out_repositories() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();

    let manager = DbManager::from_client(db).await.unwrap();

    let state = SuspendedState::new("https://sp.example/meta").with_attribute("uid", ["alice"]);
    let state_id = manager
        .state_repository()
        .save_state(&state, STATE_STAGE)
        .await
        .unwrap();

    let store = manager.key_value_store();
    store
        .set(
            "string",
            "duouniversal:n0nce",
            &state_id,
            Utc::now() + Duration::seconds(300),
        )
        .await
        .unwrap();
    let taken = store.take("string", "duouniversal:n0nce").await.unwrap();
    assert_eq!(taken.as_deref(), Some(state_id.as_str()));

    let flags = manager.session_flags();
    flags
        .mark_verified("session-1", Utc::now(), Utc::now() + Duration::hours(8))
        .await
        .unwrap();
    assert!(flags.is_verified("session-1").await.unwrap());
}

#[tokio::test]
async fn manager_over_migrated_database_is_a_no_op() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();

    let first = DbManager::from_client(db.clone()).await.unwrap();
    first
        .session_flags()
        .mark_verified("session-1", Utc::now(), Utc::now() + Duration::hours(8))
        .await
        .unwrap();

    let second = DbManager::from_client(db).await.unwrap();
    assert!(second.session_flags().is_verified("session-1").await.unwrap());
}
