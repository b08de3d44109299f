//! # Revocation Engine
//!
//! Only an object's owner may revoke it. Revocation flips the ledger flag,
//! which the issuer and resolver consult on every call, then asks the store
//! to tighten the object's ACL. The store step is best-effort: a failure is
//! logged and never undoes the ledger change.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::errors::{ShareError, ShareResult};
use super::ledger::{Ledger, StoredObject};
use crate::observability::{audit, AuditAction};
use crate::store::{ObjectAcl, ObjectStore};

/// Outcome of a successful revoke
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevocationReceipt {
    pub object: StoredObject,
    /// The object was revoked by an earlier call
    pub already_revoked: bool,
    /// The store accepted the ACL change
    pub acl_tightened: bool,
}

#[derive(Debug, Clone)]
pub struct RevocationEngine {
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn ObjectStore>,
}

impl RevocationEngine {
    pub fn new(ledger: Arc<dyn Ledger>, store: Arc<dyn ObjectStore>) -> Self {
        Self { ledger, store }
    }

    /// Revoke `object_key` on behalf of `actor_id`
    pub async fn revoke(&self, object_key: &str, actor_id: &str) -> ShareResult<RevocationReceipt> {
        self.revoke_at(Utc::now(), object_key, actor_id).await
    }

    pub async fn revoke_at(
        &self,
        now: DateTime<Utc>,
        object_key: &str,
        actor_id: &str,
    ) -> ShareResult<RevocationReceipt> {
        let object = self
            .ledger
            .get(object_key)?
            .ok_or_else(|| ShareError::NotFound(object_key.to_string()))?;

        if !object.is_owned_by(actor_id) {
            audit(AuditAction::RevokeDenied, Some(object_key), Some(actor_id), "not owner");
            return Err(ShareError::Forbidden {
                object_key: object_key.to_string(),
                actor: actor_id.to_string(),
            });
        }

        let outcome = self.ledger.revoke(object_key, now)?;
        let already_revoked = outcome.was_already_revoked();
        let object = outcome.object().clone();

        // Repeated on every call so an earlier failed attempt gets another go
        let acl_tightened = match self.store.set_acl(object_key, ObjectAcl::Private).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    object_key,
                    error = %e,
                    "store ACL tightening failed; ledger revocation still applies"
                );
                false
            }
        };

        audit(
            AuditAction::ObjectRevoked,
            Some(object_key),
            Some(actor_id),
            if already_revoked { "already revoked" } else { "revoked" },
        );

        Ok(RevocationReceipt {
            object,
            already_revoked,
            acl_tightened,
        })
    }
}
