//! # Capability Issuer
//!
//! Mints download capabilities for ledgered objects. Revoked objects never
//! get new capabilities, whatever lifetime is requested.
//!
//! Requested lifetimes outside `[1, max_ttl]` are clamped into range rather
//! than rejected.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use super::capability::{AccessCapability, CapabilitySigner};
use super::errors::{ShareError, ShareResult};
use super::ledger::Ledger;

/// A capability together with its signed token
#[derive(Debug, Clone)]
pub struct IssuedCapability {
    pub capability: AccessCapability,
    pub token: String,
}

/// Hard ceiling on any capability lifetime (one year)
pub const TTL_CEILING_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Clamp a requested lifetime into `[1, max_ttl_seconds]`. `max_ttl_seconds`
/// itself is bounded by [`TTL_CEILING_SECONDS`].
pub fn clamp_ttl(requested_ttl_seconds: i64, max_ttl_seconds: u64) -> u64 {
    let max = max_ttl_seconds.clamp(1, TTL_CEILING_SECONDS) as i64;
    requested_ttl_seconds.clamp(1, max) as u64
}

/// Capability issuer
#[derive(Debug, Clone)]
pub struct CapabilityIssuer {
    ledger: Arc<dyn Ledger>,
    signer: CapabilitySigner,
}

impl CapabilityIssuer {
    pub fn new(ledger: Arc<dyn Ledger>, signer: CapabilitySigner) -> Self {
        Self { ledger, signer }
    }

    pub fn signer(&self) -> &CapabilitySigner {
        &self.signer
    }

    /// Issue a capability valid from now
    pub fn issue(
        &self,
        object_key: &str,
        requested_ttl_seconds: i64,
        max_ttl_seconds: u64,
    ) -> ShareResult<IssuedCapability> {
        self.issue_at(Utc::now(), object_key, requested_ttl_seconds, max_ttl_seconds)
    }

    /// Issue a capability valid from `now`
    pub fn issue_at(
        &self,
        now: DateTime<Utc>,
        object_key: &str,
        requested_ttl_seconds: i64,
        max_ttl_seconds: u64,
    ) -> ShareResult<IssuedCapability> {
        let object = self
            .ledger
            .get(object_key)?
            .ok_or_else(|| ShareError::NotFound(object_key.to_string()))?;
        if object.revoked {
            return Err(ShareError::Revoked(object.object_key));
        }

        // Tokens carry whole seconds
        let now = Utc.timestamp_opt(now.timestamp(), 0).single().unwrap_or(now);
        let ttl = clamp_ttl(requested_ttl_seconds, max_ttl_seconds);
        let capability = AccessCapability {
            object_key: object.object_key,
            issued_at: now,
            expires_at: now + Duration::seconds(ttl as i64),
            nonce: Uuid::new_v4().simple().to_string(),
        };
        let token = self.signer.encode(&capability)?;

        Ok(IssuedCapability { capability, token })
    }
}
