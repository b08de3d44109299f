//! # Capability Resolver
//!
//! The fetch boundary. A capability resolves only when its signature holds,
//! it has not expired, and the ledger still lists the object as live. The
//! revocation check runs again after the bytes are fetched, so a revoke that
//! lands mid-fetch still blocks the response.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::capability::{AccessCapability, CapabilitySigner};
use super::errors::{ShareError, ShareResult};
use super::ledger::{Ledger, StoredObject};
use crate::observability::{audit, AuditAction};
use crate::store::{ObjectStore, PresignedUrl};

/// A capability resolved to its object
#[derive(Debug, Clone)]
pub struct ResolvedObject {
    pub object: StoredObject,
    pub capability: AccessCapability,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub struct CapabilityResolver {
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn ObjectStore>,
    signer: CapabilitySigner,
}

impl CapabilityResolver {
    pub fn new(ledger: Arc<dyn Ledger>, store: Arc<dyn ObjectStore>, signer: CapabilitySigner) -> Self {
        Self {
            ledger,
            store,
            signer,
        }
    }

    /// Resolve a token to the object's bytes
    pub async fn resolve(&self, token: &str) -> ShareResult<ResolvedObject> {
        self.resolve_at(Utc::now(), token).await
    }

    pub async fn resolve_at(&self, now: DateTime<Utc>, token: &str) -> ShareResult<ResolvedObject> {
        let (capability, object) = self.authorize(now, token)?;

        let data = self
            .store
            .get(&object.object_key)
            .await
            .map_err(|e| ShareError::upstream(&object.object_key, e))?;

        // Last gate before data leaves
        let object = self.live_object(&capability.object_key)?;

        audit(AuditAction::FetchServed, Some(&object.object_key), None, "proxied");
        Ok(ResolvedObject {
            object,
            capability,
            data,
        })
    }

    /// Resolve a token to a short-lived store URL. The URL lives no longer
    /// than `redirect_ttl_seconds` nor past the capability's own expiry.
    pub async fn resolve_redirect(
        &self,
        token: &str,
        redirect_ttl_seconds: u64,
    ) -> ShareResult<PresignedUrl> {
        let now = Utc::now();
        let (capability, object) = self.authorize(now, token)?;

        let ttl = capability
            .remaining_seconds(now)
            .min(redirect_ttl_seconds)
            .max(1);
        let url = self
            .store
            .presign_get(&object.object_key, ttl)
            .await
            .map_err(|e| ShareError::upstream(&object.object_key, e))?;

        self.live_object(&capability.object_key)?;
        audit(AuditAction::FetchServed, Some(&object.object_key), None, "redirected");
        Ok(url)
    }

    /// Gate a store read addressed by object key rather than by capability.
    /// Store-presigned URLs pass through here on every fetch.
    pub fn check_live(&self, object_key: &str) -> ShareResult<StoredObject> {
        let result = self.live_object(object_key);
        if let Err(e) = &result {
            audit(AuditAction::FetchDenied, e.object_key(), None, &e.to_string());
        }
        result
    }

    fn authorize(&self, now: DateTime<Utc>, token: &str) -> ShareResult<(AccessCapability, StoredObject)> {
        let result = self.signer.decode(token).and_then(|capability| {
            if capability.is_expired_at(now) {
                return Err(ShareError::Expired(capability.object_key));
            }
            let object = self.live_object(&capability.object_key)?;
            Ok((capability, object))
        });

        if let Err(e) = &result {
            audit(AuditAction::FetchDenied, e.object_key(), None, &e.to_string());
        }
        result
    }

    fn live_object(&self, object_key: &str) -> ShareResult<StoredObject> {
        let object = self
            .ledger
            .get(object_key)?
            .ok_or_else(|| ShareError::NotFound(object_key.to_string()))?;
        if object.revoked {
            return Err(ShareError::Revoked(object.object_key));
        }
        Ok(object)
    }
}
