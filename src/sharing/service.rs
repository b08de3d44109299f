//! # Share Service
//!
//! Orchestrates the upload path (validate, store, record, issue) and exposes
//! re-sharing, revocation and resolution to the HTTP layer. Every component
//! receives the same injected ledger and store.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::capability::{AccessCapability, CapabilitySigner};
use super::errors::{ShareError, ShareResult};
use super::gatekeeper::{UploadPolicy, ValidatedUpload};
use super::issuer::{CapabilityIssuer, IssuedCapability};
use super::ledger::{Ledger, StoredObject};
use super::resolver::{CapabilityResolver, ResolvedObject};
use super::retry::RetryPolicy;
use super::revocation::{RevocationEngine, RevocationReceipt};
use crate::observability::{audit, AuditAction};
use crate::store::{ObjectAcl, ObjectHead, ObjectStore, PresignedUrl, StoreError};

/// Tunables for the share service
#[derive(Debug, Clone)]
pub struct ShareSettings {
    /// Lifetime used when a request names none
    pub default_ttl_seconds: u64,
    pub max_ttl_seconds: u64,
    /// ACL new objects are written with
    pub object_acl: ObjectAcl,
    pub retry: RetryPolicy,
    /// Keys tried per upload before giving up on collisions
    pub max_key_attempts: u32,
}

impl Default for ShareSettings {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 3600,
            max_ttl_seconds: 7 * 24 * 3600,
            object_acl: ObjectAcl::Private,
            retry: RetryPolicy::default(),
            max_key_attempts: 8,
        }
    }
}

/// Result of a successful upload
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    pub object: StoredObject,
    pub capability: AccessCapability,
    pub token: String,
}

/// Owner's view of one object
#[derive(Debug, Clone)]
pub struct ObjectDetails {
    pub object: StoredObject,
    /// `None` when the store no longer has the bytes
    pub head: Option<ObjectHead>,
}

#[derive(Debug, Clone)]
pub struct ShareService {
    policy: UploadPolicy,
    settings: ShareSettings,
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn ObjectStore>,
    issuer: CapabilityIssuer,
    revocation: RevocationEngine,
    resolver: CapabilityResolver,
}

impl ShareService {
    pub fn new(
        policy: UploadPolicy,
        settings: ShareSettings,
        ledger: Arc<dyn Ledger>,
        store: Arc<dyn ObjectStore>,
        signer: CapabilitySigner,
    ) -> Self {
        Self {
            issuer: CapabilityIssuer::new(ledger.clone(), signer.clone()),
            revocation: RevocationEngine::new(ledger.clone(), store.clone()),
            resolver: CapabilityResolver::new(ledger.clone(), store.clone(), signer),
            policy,
            settings,
            ledger,
            store,
        }
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    pub fn settings(&self) -> &ShareSettings {
        &self.settings
    }

    /// Validate, store, record and share a new file
    pub async fn upload(
        &self,
        owner_id: &str,
        filename: &str,
        content_type: Option<&str>,
        data: Bytes,
        requested_ttl_seconds: Option<i64>,
    ) -> ShareResult<UploadReceipt> {
        self.upload_at(Utc::now(), owner_id, filename, content_type, data, requested_ttl_seconds)
            .await
    }

    pub async fn upload_at(
        &self,
        now: DateTime<Utc>,
        owner_id: &str,
        filename: &str,
        content_type: Option<&str>,
        data: Bytes,
        requested_ttl_seconds: Option<i64>,
    ) -> ShareResult<UploadReceipt> {
        let upload = self
            .policy
            .validate(filename, content_type, data.len() as u64)
            .map_err(|e| {
                audit(AuditAction::UploadRejected, None, Some(owner_id), &e.to_string());
                e
            })?;

        let object_key = self.store_new_object(now, &upload, data).await?;

        let object = StoredObject {
            object_key: object_key.clone(),
            owner_id: owner_id.to_string(),
            original_filename: upload.original_filename.clone(),
            content_type: upload.content_type.clone(),
            size_bytes: upload.size_bytes,
            created_at: now,
            revoked: false,
            revoked_at: None,
        };
        let object = self.ledger.record(object).map_err(|e| {
            tracing::error!(
                object_key = %object_key,
                error = %e,
                "object stored but not recorded; it is unreachable through links"
            );
            e
        })?;
        audit(AuditAction::UploadRecorded, Some(&object_key), Some(owner_id), &upload.content_type);

        let ttl = requested_ttl_seconds.unwrap_or(self.default_ttl());
        let link = self
            .issuer
            .issue_at(now, &object_key, ttl, self.settings.max_ttl_seconds)?;
        audit(AuditAction::LinkIssued, Some(&object_key), Some(owner_id), "upload");

        Ok(UploadReceipt {
            object,
            capability: link.capability,
            token: link.token,
        })
    }

    /// Write the bytes under the first free key derived from the upload
    async fn store_new_object(
        &self,
        now: DateTime<Utc>,
        upload: &ValidatedUpload,
        data: Bytes,
    ) -> ShareResult<String> {
        let attempts = self.settings.max_key_attempts.max(1);
        let mut last_key = upload.storage_key(now, 0);

        for attempt in 0..attempts {
            let key = upload.storage_key(now, attempt);
            let result = self
                .settings
                .retry
                .run("put", || {
                    self.store
                        .put(&key, data.clone(), &upload.content_type, self.settings.object_acl)
                })
                .await;

            match result {
                Ok(()) => return Ok(key),
                Err(StoreError::AlreadyExists(_)) => {
                    tracing::debug!(object_key = %key, "storage key taken, trying next");
                    last_key = key;
                }
                Err(e) => {
                    tracing::error!(object_key = %key, error = %e, "object store write failed");
                    return Err(ShareError::upstream(&key, e));
                }
            }
        }

        Err(ShareError::Conflict(last_key))
    }

    /// Mint a fresh link for an existing object. Owner only.
    pub fn share(
        &self,
        actor_id: &str,
        object_key: &str,
        requested_ttl_seconds: Option<i64>,
    ) -> ShareResult<IssuedCapability> {
        let result = self.owned_object(actor_id, object_key).and_then(|_| {
            self.issuer.issue(
                object_key,
                requested_ttl_seconds.unwrap_or(self.default_ttl()),
                self.settings.max_ttl_seconds,
            )
        });

        match &result {
            Ok(_) => audit(AuditAction::LinkIssued, Some(object_key), Some(actor_id), "share"),
            Err(e) => audit(AuditAction::LinkRejected, Some(object_key), Some(actor_id), &e.to_string()),
        }
        result
    }

    /// Revoke an object. Owner only; repeat calls succeed.
    pub async fn revoke(&self, actor_id: &str, object_key: &str) -> ShareResult<RevocationReceipt> {
        self.revocation.revoke(object_key, actor_id).await
    }

    /// Resolve a link token to the object's bytes
    pub async fn resolve(&self, token: &str) -> ShareResult<ResolvedObject> {
        self.resolver.resolve(token).await
    }

    /// Resolve a link token to a short-lived store URL
    pub async fn resolve_redirect(&self, token: &str, redirect_ttl_seconds: u64) -> ShareResult<PresignedUrl> {
        self.resolver.resolve_redirect(token, redirect_ttl_seconds).await
    }

    /// The ledger entry for `object_key` when it may still be served.
    /// `Revoked` or `NotFound` otherwise.
    pub fn ensure_live(&self, object_key: &str) -> ShareResult<StoredObject> {
        self.resolver.check_live(object_key)
    }

    /// Objects owned by `owner_id`, newest first
    pub fn list(&self, owner_id: &str) -> ShareResult<Vec<StoredObject>> {
        self.ledger.list_by_owner(owner_id)
    }

    /// Ledger entry plus store attributes. Owner only.
    pub async fn describe(&self, actor_id: &str, object_key: &str) -> ShareResult<ObjectDetails> {
        let object = self.owned_object(actor_id, object_key)?;
        let head = match self.store.head(object_key).await {
            Ok(head) => Some(head),
            Err(StoreError::NotFound(_)) => None,
            Err(e) => return Err(ShareError::upstream(object_key, e)),
        };
        Ok(ObjectDetails { object, head })
    }

    fn owned_object(&self, actor_id: &str, object_key: &str) -> ShareResult<StoredObject> {
        let object = self
            .ledger
            .get(object_key)?
            .ok_or_else(|| ShareError::NotFound(object_key.to_string()))?;
        if !object.is_owned_by(actor_id) {
            return Err(ShareError::Forbidden {
                object_key: object_key.to_string(),
                actor: actor_id.to_string(),
            });
        }
        Ok(object)
    }

    fn default_ttl(&self) -> i64 {
        self.settings.default_ttl_seconds.min(i64::MAX as u64) as i64
    }
}
