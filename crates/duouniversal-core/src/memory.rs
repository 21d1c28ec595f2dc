//! In-memory collaborator implementations.
//!
//! Suitable for tests and single-process deployments. Clones share the
//! same underlying maps.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::DuoResult;
use crate::models::state::SuspendedState;
use crate::repository::{KeyValueStore, SessionFlagStore, StateRepository};

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Key-value store that honours expiry on read.
#[derive(Debug, Clone)]
pub struct InMemoryKeyValueStore {
    entries: Arc<RwLock<HashMap<(String, String), StoredValue>>>,
    clock_offset: Arc<RwLock<Duration>>,
}

impl Default for InMemoryKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::default(),
            clock_offset: Arc::new(RwLock::new(Duration::zero())),
        }
    }

    /// Move this store's notion of "now" forward.
    pub async fn advance_clock(&self, by: Duration) {
        let mut offset = self.clock_offset.write().await;
        *offset += by;
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stored keys of the given kind, expired ones included.
    pub async fn keys(&self, kind: &str) -> Vec<String> {
        self.entries
            .read()
            .await
            .keys()
            .filter(|(k, _)| k == kind)
            .map(|(_, key)| key.clone())
            .collect()
    }

    async fn now(&self) -> DateTime<Utc> {
        Utc::now() + *self.clock_offset.read().await
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    async fn set(
        &self,
        kind: &str,
        key: &str,
        value: &str,
        expires_at: DateTime<Utc>,
    ) -> DuoResult<()> {
        let mut entries = self.entries.write().await;
        entries.insert(
            (kind.to_string(), key.to_string()),
            StoredValue {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get(&self, kind: &str, key: &str) -> DuoResult<Option<String>> {
        let now = self.now().await;
        let entries = self.entries.read().await;
        Ok(entries
            .get(&(kind.to_string(), key.to_string()))
            .filter(|stored| stored.expires_at > now)
            .map(|stored| stored.value.clone()))
    }

    async fn delete(&self, kind: &str, key: &str) -> DuoResult<()> {
        let mut entries = self.entries.write().await;
        entries.remove(&(kind.to_string(), key.to_string()));
        Ok(())
    }

    async fn take(&self, kind: &str, key: &str) -> DuoResult<Option<String>> {
        let now = self.now().await;
        let mut entries = self.entries.write().await;
        Ok(entries
            .remove(&(kind.to_string(), key.to_string()))
            .filter(|stored| stored.expires_at > now)
            .map(|stored| stored.value))
    }
}

/// State repository keyed by random UUIDs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStateRepository {
    states: Arc<RwLock<HashMap<String, (String, SuspendedState)>>>,
}

impl InMemoryStateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Replace a saved state in place, keeping its id and stage.
    pub async fn overwrite(&self, state_id: &str, state: SuspendedState) -> bool {
        let mut states = self.states.write().await;
        match states.get_mut(state_id) {
            Some((_, saved)) => {
                *saved = state;
                true
            }
            None => false,
        }
    }
}

impl StateRepository for InMemoryStateRepository {
    async fn save_state(&self, state: &SuspendedState, stage: &str) -> DuoResult<String> {
        let id = Uuid::new_v4().to_string();
        let mut states = self.states.write().await;
        states.insert(id.clone(), (stage.to_string(), state.clone()));
        Ok(id)
    }

    async fn load_state(&self, state_id: &str, stage: &str) -> DuoResult<Option<SuspendedState>> {
        let states = self.states.read().await;
        Ok(states
            .get(state_id)
            .filter(|(saved_stage, _)| saved_stage == stage)
            .map(|(_, state)| state.clone()))
    }
}

#[derive(Debug, Clone, Copy)]
struct SessionFlag {
    verified_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Session flags with per-flag expiry.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionFlags {
    flags: Arc<RwLock<HashMap<String, SessionFlag>>>,
}

impl InMemorySessionFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// When the session passed, if the flag is still live.
    pub async fn verified_at(&self, session_id: &str) -> Option<DateTime<Utc>> {
        let now = Utc::now();
        self.flags
            .read()
            .await
            .get(session_id)
            .filter(|flag| flag.expires_at > now)
            .map(|flag| flag.verified_at)
    }
}

impl SessionFlagStore for InMemorySessionFlags {
    async fn is_verified(&self, session_id: &str) -> DuoResult<bool> {
        Ok(self.verified_at(session_id).await.is_some())
    }

    async fn mark_verified(
        &self,
        session_id: &str,
        verified_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> DuoResult<()> {
        let mut flags = self.flags.write().await;
        flags.insert(
            session_id.to_string(),
            SessionFlag {
                verified_at,
                expires_at,
            },
        );
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> DuoResult<()> {
        self.flags.write().await.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn kv_entry_expires() {
        let store = InMemoryKeyValueStore::new();
        let expires = Utc::now() + Duration::seconds(300);
        store.set("string", "p:n", "state-1", expires).await.unwrap();

        assert_eq!(
            store.get("string", "p:n").await.unwrap().as_deref(),
            Some("state-1")
        );

        store.advance_clock(Duration::seconds(301)).await;
        assert_eq!(store.get("string", "p:n").await.unwrap(), None);
    }

    #[tokio::test]
    async fn kv_kinds_are_separate() {
        let store = InMemoryKeyValueStore::new();
        let expires = Utc::now() + Duration::seconds(60);
        store.set("string", "k", "a", expires).await.unwrap();

        assert_eq!(store.get("other", "k").await.unwrap(), None);
        store.delete("string", "k").await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn state_load_requires_matching_stage() {
        let repo = InMemoryStateRepository::new();
        let state = SuspendedState::new("https://sp.example/meta");
        let id = repo.save_state(&state, "stage-a").await.unwrap();

        assert_eq!(repo.load_state(&id, "stage-a").await.unwrap(), Some(state));
        assert_eq!(repo.load_state(&id, "stage-b").await.unwrap(), None);
        assert_eq!(repo.load_state("nope", "stage-a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn kv_take_is_single_use() {
        let store = InMemoryKeyValueStore::new();
        let expires = Utc::now() + Duration::seconds(300);
        store.set("string", "p:n", "state-1", expires).await.unwrap();

        assert_eq!(
            store.take("string", "p:n").await.unwrap().as_deref(),
            Some("state-1")
        );
        assert_eq!(store.take("string", "p:n").await.unwrap(), None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn kv_take_ignores_expired_entry() {
        let store = InMemoryKeyValueStore::new();
        let expires = Utc::now() + Duration::seconds(300);
        store.set("string", "p:n", "state-1", expires).await.unwrap();

        store.advance_clock(Duration::seconds(301)).await;
        assert_eq!(store.take("string", "p:n").await.unwrap(), None);
    }

    #[tokio::test]
    async fn session_flag_roundtrip() {
        let flags = InMemorySessionFlags::new();
        assert!(!flags.is_verified("sess-1").await.unwrap());

        let now = Utc::now();
        flags
            .mark_verified("sess-1", now, now + Duration::hours(8))
            .await
            .unwrap();
        assert!(flags.is_verified("sess-1").await.unwrap());
        assert_eq!(flags.verified_at("sess-1").await, Some(now));

        flags.clear("sess-1").await.unwrap();
        assert!(!flags.is_verified("sess-1").await.unwrap());
    }

    #[tokio::test]
    async fn expired_session_flag_is_not_verified() {
        let flags = InMemorySessionFlags::new();
        let now = Utc::now();
        flags
            .mark_verified("sess-1", now - Duration::hours(9), now - Duration::hours(1))
            .await
            .unwrap();

        assert!(!flags.is_verified("sess-1").await.unwrap());
    }
}
