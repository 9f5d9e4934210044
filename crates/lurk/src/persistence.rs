//! # Room Persistence
//!
//! Room state leaves the process as a JSON [`RoomSnapshot`] written to an
//! opaque key-value [`BlobStore`]. Storage calls are async and bounded by the
//! collaborator timeout like appearance calls.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use lurk_camouflage::DisguiseSessionRecord;
use lurk_security::ViolationStats;
use lurk_shared::{DiscoveryEvent, ParticipantId, TimestampMs};

use crate::interaction::InteractionStats;

/// Storage failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    /// The backend refused the call.
    #[error("blob store failed: {0}")]
    Backend(String),

    /// The snapshot could not be encoded or decoded.
    #[error("snapshot encoding failed: {0}")]
    Encoding(String),

    /// The call exceeded its budget.
    #[error("blob store call for '{key}' timed out after {budget_ms} ms")]
    Timeout {
        /// Blob key.
        key: String,
        /// Budget that was exceeded.
        budget_ms: u64,
    },
}

/// Opaque key-value blob storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `blob` under `key`, replacing any previous value.
    async fn put(&self, key: &str, blob: Vec<u8>) -> Result<(), PersistenceError>;

    /// Loads the blob under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError>;
}

/// In-process blob store.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    /// True if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.lock().is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, blob: Vec<u8>) -> Result<(), PersistenceError> {
        self.blobs.lock().insert(key.to_owned(), blob);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        Ok(self.blobs.lock().get(key).cloned())
    }
}

/// Serializable view of a room.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    /// When the snapshot was taken.
    pub taken_at: TimestampMs,
    /// Maintenance ticks run so far.
    pub ticks: u64,
    /// Discovery log, oldest first.
    pub discoveries: Vec<DiscoveryEvent>,
    /// Currently discovered participants.
    pub discovered: Vec<ParticipantId>,
    /// Live sessions, by participant.
    pub active_sessions: Vec<DisguiseSessionRecord>,
    /// Ended sessions, oldest first.
    pub history: Vec<DisguiseSessionRecord>,
    /// Movement violation counters.
    pub violations: ViolationStats,
    /// Probe counters.
    pub interactions: InteractionStats,
}

impl RoomSnapshot {
    /// JSON encoding.
    ///
    /// # Errors
    ///
    /// `Encoding` if a payload holds a non-finite float.
    pub fn to_json(&self) -> Result<Vec<u8>, PersistenceError> {
        serde_json::to_vec(self).map_err(|e| PersistenceError::Encoding(e.to_string()))
    }

    /// Decodes a snapshot.
    ///
    /// # Errors
    ///
    /// `Encoding` if the bytes are not a snapshot.
    pub fn from_json(bytes: &[u8]) -> Result<Self, PersistenceError> {
        serde_json::from_slice(bytes).map_err(|e| PersistenceError::Encoding(e.to_string()))
    }
}

/// Writes `snapshot` under `key` within `budget_ms`.
///
/// # Errors
///
/// `Encoding`, `Backend` or `Timeout`.
pub async fn save_snapshot(
    store: &dyn BlobStore,
    key: &str,
    snapshot: &RoomSnapshot,
    budget_ms: u64,
) -> Result<(), PersistenceError> {
    let blob = snapshot.to_json()?;
    let size = blob.len();
    match tokio::time::timeout(Duration::from_millis(budget_ms), store.put(key, blob)).await {
        Ok(result) => {
            result?;
            tracing::debug!(key, bytes = size, "room snapshot persisted");
            Ok(())
        }
        Err(_) => Err(PersistenceError::Timeout {
            key: key.to_owned(),
            budget_ms,
        }),
    }
}

/// Reads the snapshot under `key`, if any, within `budget_ms`.
///
/// # Errors
///
/// `Encoding`, `Backend` or `Timeout`.
pub async fn load_snapshot(
    store: &dyn BlobStore,
    key: &str,
    budget_ms: u64,
) -> Result<Option<RoomSnapshot>, PersistenceError> {
    match tokio::time::timeout(Duration::from_millis(budget_ms), store.get(key)).await {
        Ok(result) => result?.map(|b| RoomSnapshot::from_json(&b)).transpose(),
        Err(_) => Err(PersistenceError::Timeout {
            key: key.to_owned(),
            budget_ms,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lurk_shared::{DiscoveryMethod, Vec3};

    fn snapshot() -> RoomSnapshot {
        RoomSnapshot {
            taken_at: 1_700_000_000_000,
            ticks: 3,
            discoveries: vec![DiscoveryEvent {
                id: 1,
                participant: ParticipantId(4),
                discoverer: Some(ParticipantId(9)),
                method: DiscoveryMethod::Proximity,
                position: Vec3::new(1.0, 0.0, 2.0),
                timestamp: 1_700_000_000_000,
                confidence: 0.7,
            }],
            discovered: vec![ParticipantId(4)],
            active_sessions: Vec::new(),
            history: Vec::new(),
            violations: ViolationStats::default(),
            interactions: InteractionStats::default(),
        }
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = MemoryBlobStore::new();
        save_snapshot(&store, "room/1", &snapshot(), 100).await.unwrap();
        assert_eq!(store.len(), 1);

        let loaded = load_snapshot(&store, "room/1", 100).await.unwrap().unwrap();
        assert_eq!(loaded, snapshot());
        assert!(load_snapshot(&store, "room/2", 100).await.unwrap().is_none());
    }

    #[test]
    fn test_snapshot_wire_shape() {
        let json: serde_json::Value = serde_json::from_slice(&snapshot().to_json().unwrap()).unwrap();
        assert_eq!(json["discoveries"][0]["method"], "proximity");
        assert_eq!(json["discoveries"][0]["position"]["z"], 2.0);
        assert_eq!(json["discovered"][0], 4);
    }

    #[tokio::test]
    async fn test_garbage_is_an_encoding_error() {
        let store = MemoryBlobStore::new();
        store.put("bad", b"not json".to_vec()).await.unwrap();
        assert!(matches!(
            load_snapshot(&store, "bad", 100).await,
            Err(PersistenceError::Encoding(_))
        ));
    }
}
