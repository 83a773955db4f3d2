//! Durable snapshot persistence.
//!
//! Snapshots are JSON blobs keyed by block hash under a dedicated prefix in
//! the host's key-value store, with a small LRU of recent snapshots in front.
//! Read failures are downgraded to cache misses: the engine then walks back
//! to an older persisted snapshot and replays forward.

use crate::cache::LruCache;
use crate::constants::{SNAPSHOT_CACHE_SIZE, SNAPSHOT_DB_PREFIX};
use crate::errors::EngineError;
use crate::snapshot::Snapshot;
use alloy_primitives::B256;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Key-value persistence seam provided by the host.
pub trait SnapshotDb: Send + Sync {
    /// Fetch the value stored under `key`, if any.
    fn get(&self, key: &[u8]) -> std::io::Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, overwriting any previous value.
    fn put(&self, key: &[u8], value: &[u8]) -> std::io::Result<()>;
}

/// In-memory key-value store for tests and ephemeral nodes.
#[derive(Debug, Default)]
pub struct MemoryDb {
    entries: Mutex<std::collections::HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryDb {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotDb for MemoryDb {
    fn get(&self, key: &[u8]) -> std::io::Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().expect("memory db lock").get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> std::io::Result<()> {
        self.entries
            .lock()
            .expect("memory db lock")
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }
}

/// LRU-fronted snapshot persistence.
pub struct SnapshotStore {
    db: Arc<dyn SnapshotDb>,
    cache: Mutex<LruCache<B256, Snapshot>>,
}

impl SnapshotStore {
    /// Create a store over the host database.
    pub fn new(db: Arc<dyn SnapshotDb>) -> Self {
        Self {
            db,
            cache: Mutex::new(LruCache::new(SNAPSHOT_CACHE_SIZE)),
        }
    }

    fn key(hash: B256) -> Vec<u8> {
        let mut key = Vec::with_capacity(SNAPSHOT_DB_PREFIX.len() + 32);
        key.extend_from_slice(SNAPSHOT_DB_PREFIX);
        key.extend_from_slice(hash.as_slice());
        key
    }

    /// Look up the snapshot for the block with `hash` in the LRU only.
    pub fn cached(&self, hash: B256) -> Option<Snapshot> {
        self.cache
            .lock()
            .expect("snapshot cache lock")
            .get(&hash)
            .cloned()
    }

    /// Look up the snapshot for the block with `hash`, consulting the LRU and
    /// then disk. Disk errors and undecodable payloads count as misses.
    pub fn load(&self, hash: B256) -> Option<Snapshot> {
        if let Some(snap) = self.cached(hash) {
            return Some(snap);
        }

        let bytes = match self.db.get(&Self::key(hash)) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                warn!(target: "chaophraya::store", %hash, %err, "snapshot read failed, treating as miss");
                return None;
            }
        };
        let snap: Snapshot = match serde_json::from_slice(&bytes) {
            Ok(snap) => snap,
            Err(err) => {
                warn!(target: "chaophraya::store", %hash, %err, "snapshot payload undecodable, treating as miss");
                return None;
            }
        };

        debug!(target: "chaophraya::store", number = snap.number, %hash, "loaded snapshot from disk");
        self.remember(snap.clone());
        Some(snap)
    }

    /// Cache a snapshot in memory without persisting it.
    pub fn remember(&self, snap: Snapshot) {
        self.cache
            .lock()
            .expect("snapshot cache lock")
            .insert(snap.hash, snap);
    }

    /// Persist a snapshot to disk and cache it.
    pub fn save(&self, snap: &Snapshot) -> Result<(), EngineError> {
        let bytes = serde_json::to_vec(snap)
            .map_err(|err| EngineError::GetSnapshotFailed(err.to_string()))?;
        self.db
            .put(&Self::key(snap.hash), &bytes)
            .map_err(|err| EngineError::GetSnapshotFailed(err.to_string()))?;
        debug!(target: "chaophraya::store", number = snap.number, hash = %snap.hash, "persisted snapshot");
        self.remember(snap.clone());
        Ok(())
    }
}
