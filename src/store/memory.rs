//! # In-Memory Store
//!
//! Store for tests and ephemeral deployments. Failures can be queued to
//! exercise retry and best-effort paths.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration, Utc};

use super::errors::{StoreError, StoreResult};
use super::presign::{PresignedUrl, MAX_PRESIGN_TTL_SECONDS};
use super::{ObjectAcl, ObjectHead, ObjectStore};

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Bytes,
    head: ObjectHead,
}

/// In-memory object store
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, MemoryObject>>,
    put_failures: Mutex<VecDeque<StoreError>>,
    acl_failures: Mutex<VecDeque<StoreError>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `put` fail with `err`. Queued failures are consumed in
    /// order, one per call.
    pub fn fail_next_put(&self, err: StoreError) {
        if let Ok(mut queue) = self.put_failures.lock() {
            queue.push_back(err);
        }
    }

    /// Make the next `set_acl` fail with `err`
    pub fn fail_next_set_acl(&self, err: StoreError) {
        if let Ok(mut queue) = self.acl_failures.lock() {
            queue.push_back(err);
        }
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take_failure(queue: &Mutex<VecDeque<StoreError>>) -> Option<StoreError> {
        queue.lock().ok().and_then(|mut q| q.pop_front())
    }

    fn poisoned() -> StoreError {
        StoreError::Io("Lock poisoned".to_string())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        acl: ObjectAcl,
    ) -> StoreResult<()> {
        if let Some(err) = Self::take_failure(&self.put_failures) {
            return Err(err);
        }

        let mut objects = self.objects.write().map_err(|_| Self::poisoned())?;
        if objects.contains_key(key) {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }

        let head = ObjectHead {
            size: data.len() as u64,
            last_modified: Utc::now(),
            storage_class: "STANDARD".to_string(),
            content_type: content_type.to_string(),
            acl,
        };
        objects.insert(key.to_string(), MemoryObject { data, head });
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Bytes> {
        let objects = self.objects.read().map_err(|_| Self::poisoned())?;
        objects
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn head(&self, key: &str) -> StoreResult<ObjectHead> {
        let objects = self.objects.read().map_err(|_| Self::poisoned())?;
        objects
            .get(key)
            .map(|o| o.head.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn set_acl(&self, key: &str, acl: ObjectAcl) -> StoreResult<()> {
        if let Some(err) = Self::take_failure(&self.acl_failures) {
            return Err(err);
        }

        let mut objects = self.objects.write().map_err(|_| Self::poisoned())?;
        let object = objects
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        object.head.acl = acl;
        Ok(())
    }

    async fn presign_get(&self, key: &str, ttl_seconds: u64) -> StoreResult<PresignedUrl> {
        self.head(key).await?;
        let expires_at = Utc::now() + Duration::seconds(ttl_seconds.min(MAX_PRESIGN_TTL_SECONDS) as i64);
        Ok(PresignedUrl {
            url: format!("memory://{}?expires={}", key, expires_at.timestamp()),
            expires_at,
        })
    }
}
