//! Persistence Façade
//!
//! Character sheets are persisted through an idempotent upsert; session
//! history is an append-only log plus periodic full snapshots (initial state
//! plus incremental records, recoverable without replaying the whole log),
//! behind a storage trait so a durable backend can replace the in-memory
//! default without touching session logic.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::game::{GameState, PrincipalId};

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("character {0} not found")]
    CharacterNotFound(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// A persisted character sheet. Opaque to the persistence layer beyond its
/// id and owner — the session engine is the only thing that interprets
/// `sheet`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterRecord {
    pub character_id: String,
    pub owner_principal: PrincipalId,
    pub sheet: serde_json::Value,
    pub version: u64,
}

/// One entry in a session's append-only log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub sequence: u64,
    pub summary: String,
}

/// A periodic full snapshot of a session's game state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub sequence: u64,
    pub state: GameState,
}

/// Storage abstraction: an append-only log plus a small KV store for
/// characters and snapshots. The in-memory implementation below is the
/// default; a durable backend only needs to implement this trait.
#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    async fn upsert_character(&self, record: CharacterRecord) -> Result<(), PersistError>;
    async fn get_character(&self, character_id: &str) -> Result<Option<CharacterRecord>, PersistError>;
    async fn list_characters(&self, owner: &PrincipalId) -> Result<Vec<CharacterRecord>, PersistError>;

    async fn append_log(&self, session_id: &str, entry: LogEntry) -> Result<(), PersistError>;
    async fn read_log(&self, session_id: &str) -> Result<Vec<LogEntry>, PersistError>;

    async fn write_snapshot(&self, session_id: &str, snapshot: Snapshot) -> Result<(), PersistError>;
    async fn latest_snapshot(&self, session_id: &str) -> Result<Option<Snapshot>, PersistError>;
}

/// Every `SNAPSHOT_INTERVAL` accepted actions, take a full snapshot instead
/// of relying solely on the append-only log for recovery.
pub const SNAPSHOT_INTERVAL: u64 = 50;

/// Default, process-local storage implementation.
#[derive(Default)]
pub struct InMemoryStorage {
    characters: RwLock<BTreeMap<String, CharacterRecord>>,
    logs: RwLock<BTreeMap<String, Vec<LogEntry>>>,
    snapshots: RwLock<BTreeMap<String, Snapshot>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<dyn Storage> {
        Arc::new(Self::new())
    }
}

#[async_trait::async_trait]
impl Storage for InMemoryStorage {
    /// Upsert is idempotent on `character_id`: syncing the same sheet twice
    /// with no changes still succeeds and simply bumps `version`.
    async fn upsert_character(&self, record: CharacterRecord) -> Result<(), PersistError> {
        let mut characters = self.characters.write().await;
        let version = characters
            .get(&record.character_id)
            .map(|existing| existing.version + 1)
            .unwrap_or(1);
        characters.insert(record.character_id.clone(), CharacterRecord { version, ..record });
        Ok(())
    }

    async fn get_character(&self, character_id: &str) -> Result<Option<CharacterRecord>, PersistError> {
        Ok(self.characters.read().await.get(character_id).cloned())
    }

    async fn list_characters(&self, owner: &PrincipalId) -> Result<Vec<CharacterRecord>, PersistError> {
        Ok(self
            .characters
            .read()
            .await
            .values()
            .filter(|c| &c.owner_principal == owner)
            .cloned()
            .collect())
    }

    async fn append_log(&self, session_id: &str, entry: LogEntry) -> Result<(), PersistError> {
        self.logs.write().await.entry(session_id.to_string()).or_default().push(entry);
        Ok(())
    }

    async fn read_log(&self, session_id: &str) -> Result<Vec<LogEntry>, PersistError> {
        Ok(self.logs.read().await.get(session_id).cloned().unwrap_or_default())
    }

    async fn write_snapshot(&self, session_id: &str, snapshot: Snapshot) -> Result<(), PersistError> {
        self.snapshots.write().await.insert(session_id.to_string(), snapshot);
        Ok(())
    }

    async fn latest_snapshot(&self, session_id: &str) -> Result<Option<Snapshot>, PersistError> {
        Ok(self.snapshots.read().await.get(session_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(owner: &str) -> CharacterRecord {
        CharacterRecord {
            character_id: "c1".into(),
            owner_principal: PrincipalId::new(owner),
            sheet: serde_json::json!({"name": "Arin"}),
            version: 0,
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_and_bumps_version() {
        let storage = InMemoryStorage::new();
        storage.upsert_character(sample_record("p1")).await.unwrap();
        storage.upsert_character(sample_record("p1")).await.unwrap();
        let stored = storage.get_character("c1").await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn list_characters_filters_by_owner() {
        let storage = InMemoryStorage::new();
        storage.upsert_character(sample_record("p1")).await.unwrap();
        let mut other = sample_record("p2");
        other.character_id = "c2".into();
        storage.upsert_character(other).await.unwrap();

        let found = storage.list_characters(&PrincipalId::new("p1")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].character_id, "c1");
    }

    #[tokio::test]
    async fn log_entries_accumulate_in_order() {
        let storage = InMemoryStorage::new();
        storage.append_log("s1", LogEntry { sequence: 0, summary: "a".into() }).await.unwrap();
        storage.append_log("s1", LogEntry { sequence: 1, summary: "b".into() }).await.unwrap();
        let log = storage.read_log("s1").await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].summary, "b");
    }

    #[tokio::test]
    async fn snapshot_overwrites_previous_for_same_session() {
        let storage = InMemoryStorage::new();
        let state = GameState::new(1);
        storage.write_snapshot("s1", Snapshot { sequence: 1, state: state.clone() }).await.unwrap();
        storage.write_snapshot("s1", Snapshot { sequence: 2, state }).await.unwrap();
        let latest = storage.latest_snapshot("s1").await.unwrap().unwrap();
        assert_eq!(latest.sequence, 2);
    }
}
