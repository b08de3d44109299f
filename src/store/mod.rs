//! # Object Store Boundary
//!
//! The bucket behind the sharing core. Every client (filesystem, in-memory,
//! or a cloud SDK wrapper) implements [`ObjectStore`] and is injected into the
//! components that need it as an `Arc<dyn ObjectStore>`.

pub mod errors;
pub mod local;
pub mod memory;
pub mod presign;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use errors::{StoreError, StoreResult};
pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;
pub use presign::{PresignedUrl, UrlSigner};

/// Per-object access control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectAcl {
    /// Only signed requests may read
    #[default]
    Private,
    /// Anyone with the plain object URL may read
    PublicRead,
}

impl ObjectAcl {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectAcl::Private => "private",
            ObjectAcl::PublicRead => "public-read",
        }
    }
}

/// Object attributes as reported by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectHead {
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub storage_class: String,
    pub content_type: String,
    pub acl: ObjectAcl,
}

/// Client for a single bucket
#[async_trait]
pub trait ObjectStore: Send + Sync + std::fmt::Debug {
    /// Write a new object. Fails with [`StoreError::AlreadyExists`] when the
    /// key is taken; existing objects are never overwritten.
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        acl: ObjectAcl,
    ) -> StoreResult<()>;

    /// Read an object's bytes
    async fn get(&self, key: &str) -> StoreResult<Bytes>;

    /// Read an object's attributes
    async fn head(&self, key: &str) -> StoreResult<ObjectHead>;

    /// Replace an object's ACL
    async fn set_acl(&self, key: &str, acl: ObjectAcl) -> StoreResult<()>;

    /// Produce a time-limited URL that reads the object without further
    /// authentication.
    async fn presign_get(&self, key: &str, ttl_seconds: u64) -> StoreResult<PresignedUrl>;
}
