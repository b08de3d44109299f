//! # Object Ledger
//!
//! Durable record of every uploaded object and its revocation state.
//!
//! Uniqueness of `object_key` is enforced by the backend (insert-if-absent),
//! and revocation is a compare-and-set on the `revoked` flag, so concurrent
//! callers never need application-level locks of their own.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{ShareError, ShareResult};

/// A ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub object_key: String,
    pub owner_id: String,
    pub original_filename: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub revoked: bool,
    #[serde(default)]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl StoredObject {
    /// Create a new, unrevoked entry stamped with the current time
    pub fn new(
        object_key: impl Into<String>,
        owner_id: impl Into<String>,
        original_filename: impl Into<String>,
        content_type: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        Self {
            object_key: object_key.into(),
            owner_id: owner_id.into(),
            original_filename: original_filename.into(),
            content_type: content_type.into(),
            size_bytes,
            created_at: Utc::now(),
            revoked: false,
            revoked_at: None,
        }
    }

    pub fn is_owned_by(&self, actor_id: &str) -> bool {
        self.owner_id == actor_id
    }
}

/// Result of a successful revoke
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevokeOutcome {
    /// This call flipped the flag
    Revoked(StoredObject),
    /// The object was already revoked; state is unchanged
    AlreadyRevoked(StoredObject),
}

impl RevokeOutcome {
    pub fn object(&self) -> &StoredObject {
        match self {
            RevokeOutcome::Revoked(o) | RevokeOutcome::AlreadyRevoked(o) => o,
        }
    }

    pub fn was_already_revoked(&self) -> bool {
        matches!(self, RevokeOutcome::AlreadyRevoked(_))
    }
}

/// Ledger persistence
pub trait Ledger: Send + Sync + std::fmt::Debug {
    /// Insert a new entry. Fails with [`ShareError::Conflict`] when the key
    /// is already recorded.
    fn record(&self, object: StoredObject) -> ShareResult<StoredObject>;

    /// Look up an entry. Unknown keys are `None`, never a default record.
    fn get(&self, object_key: &str) -> ShareResult<Option<StoredObject>>;

    /// Mark an entry revoked at `at`. Idempotent; unknown keys are
    /// [`ShareError::NotFound`].
    fn revoke(&self, object_key: &str, at: DateTime<Utc>) -> ShareResult<RevokeOutcome>;

    /// Entries owned by `owner_id`, newest first
    fn list_by_owner(&self, owner_id: &str) -> ShareResult<Vec<StoredObject>>;

    /// Whether the entry is revoked. Unknown keys report `false`; use
    /// [`Ledger::get`] to tell unknown from live.
    fn is_revoked(&self, object_key: &str) -> ShareResult<bool> {
        Ok(self.get(object_key)?.map(|o| o.revoked).unwrap_or(false))
    }
}

fn poisoned() -> ShareError {
    ShareError::Ledger("Lock poisoned".to_string())
}

fn insert_if_absent(
    objects: &mut HashMap<String, StoredObject>,
    object: StoredObject,
) -> ShareResult<StoredObject> {
    if objects.contains_key(&object.object_key) {
        return Err(ShareError::Conflict(object.object_key));
    }
    objects.insert(object.object_key.clone(), object.clone());
    Ok(object)
}

fn compare_and_revoke(
    objects: &mut HashMap<String, StoredObject>,
    object_key: &str,
    at: DateTime<Utc>,
) -> ShareResult<RevokeOutcome> {
    let object = objects
        .get_mut(object_key)
        .ok_or_else(|| ShareError::NotFound(object_key.to_string()))?;

    if object.revoked {
        return Ok(RevokeOutcome::AlreadyRevoked(object.clone()));
    }
    object.revoked = true;
    object.revoked_at = Some(at);
    Ok(RevokeOutcome::Revoked(object.clone()))
}

fn owned_by(objects: &HashMap<String, StoredObject>, owner_id: &str) -> Vec<StoredObject> {
    let mut owned: Vec<StoredObject> = objects
        .values()
        .filter(|o| o.owner_id == owner_id)
        .cloned()
        .collect();
    owned.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.object_key.cmp(&a.object_key))
    });
    owned
}

/// In-memory ledger
#[derive(Debug, Default)]
pub struct MemoryLedger {
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Ledger for MemoryLedger {
    fn record(&self, object: StoredObject) -> ShareResult<StoredObject> {
        let mut objects = self.objects.write().map_err(|_| poisoned())?;
        insert_if_absent(&mut objects, object)
    }

    fn get(&self, object_key: &str) -> ShareResult<Option<StoredObject>> {
        let objects = self.objects.read().map_err(|_| poisoned())?;
        Ok(objects.get(object_key).cloned())
    }

    fn revoke(&self, object_key: &str, at: DateTime<Utc>) -> ShareResult<RevokeOutcome> {
        let mut objects = self.objects.write().map_err(|_| poisoned())?;
        compare_and_revoke(&mut objects, object_key, at)
    }

    fn list_by_owner(&self, owner_id: &str) -> ShareResult<Vec<StoredObject>> {
        let objects = self.objects.read().map_err(|_| poisoned())?;
        Ok(owned_by(&objects, owner_id))
    }
}

/// Ledger persisted as a JSON snapshot file.
///
/// Every mutation rewrites the snapshot through a temporary file and a
/// rename while the write lock is held, so the file always holds a complete
/// ledger. A failed write rolls the in-memory change back.
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    objects: RwLock<HashMap<String, StoredObject>>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    objects: Vec<StoredObject>,
}

impl FileLedger {
    /// Open the ledger at `path`, creating an empty one if it does not exist
    pub fn open(path: impl AsRef<Path>) -> ShareResult<Self> {
        let path = path.as_ref().to_path_buf();
        let objects = if path.exists() {
            let raw = fs::read(&path).map_err(|e| ShareError::Ledger(e.to_string()))?;
            let snapshot: Snapshot =
                serde_json::from_slice(&raw).map_err(|e| ShareError::Ledger(e.to_string()))?;
            snapshot
                .objects
                .into_iter()
                .map(|o| (o.object_key.clone(), o))
                .collect()
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| ShareError::Ledger(e.to_string()))?;
            }
            HashMap::new()
        };

        Ok(Self {
            path,
            objects: RwLock::new(objects),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, objects: &HashMap<String, StoredObject>) -> ShareResult<()> {
        let mut entries: Vec<StoredObject> = objects.values().cloned().collect();
        entries.sort_by(|a, b| a.object_key.cmp(&b.object_key));
        let raw = serde_json::to_vec_pretty(&Snapshot { objects: entries })
            .map_err(|e| ShareError::Ledger(e.to_string()))?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, raw).map_err(|e| ShareError::Ledger(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| ShareError::Ledger(e.to_string()))
    }
}

impl Ledger for FileLedger {
    fn record(&self, object: StoredObject) -> ShareResult<StoredObject> {
        let mut objects = self.objects.write().map_err(|_| poisoned())?;
        let key = object.object_key.clone();
        let recorded = insert_if_absent(&mut objects, object)?;

        if let Err(e) = self.persist(&objects) {
            objects.remove(&key);
            return Err(e);
        }
        Ok(recorded)
    }

    fn get(&self, object_key: &str) -> ShareResult<Option<StoredObject>> {
        let objects = self.objects.read().map_err(|_| poisoned())?;
        Ok(objects.get(object_key).cloned())
    }

    fn revoke(&self, object_key: &str, at: DateTime<Utc>) -> ShareResult<RevokeOutcome> {
        let mut objects = self.objects.write().map_err(|_| poisoned())?;
        let outcome = compare_and_revoke(&mut objects, object_key, at)?;

        if let RevokeOutcome::Revoked(_) = &outcome {
            if let Err(e) = self.persist(&objects) {
                if let Some(object) = objects.get_mut(object_key) {
                    object.revoked = false;
                    object.revoked_at = None;
                }
                return Err(e);
            }
        }
        Ok(outcome)
    }

    fn list_by_owner(&self, owner_id: &str) -> ShareResult<Vec<StoredObject>> {
        let objects = self.objects.read().map_err(|_| poisoned())?;
        Ok(owned_by(&objects, owner_id))
    }
}
