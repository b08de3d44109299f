//! # Access Capabilities
//!
//! A capability is a self-contained, HMAC-signed token granting read access
//! to one object until its expiry. The token alone is never sufficient: the
//! resolver re-checks the ledger before serving data.
//!
//! Wire form: `base64url(json payload) "." base64url(HMAC-SHA256(payload))`.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::errors::{ShareError, ShareResult};

type HmacSha256 = Hmac<Sha256>;

/// A signed, expiring grant to read one object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessCapability {
    pub object_key: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub nonce: String,
}

impl AccessCapability {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whole seconds left before expiry (zero once expired)
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> u64 {
        (self.expires_at - now).num_seconds().max(0) as u64
    }
}

#[derive(Serialize, Deserialize)]
struct Payload {
    k: String,
    iat: i64,
    exp: i64,
    n: String,
}

/// Signs and verifies capability tokens
#[derive(Clone)]
pub struct CapabilitySigner {
    secret: Vec<u8>,
}

impl std::fmt::Debug for CapabilitySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilitySigner").finish_non_exhaustive()
    }
}

impl CapabilitySigner {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            secret: secret.to_vec(),
        }
    }

    /// Encode and sign a capability
    pub fn encode(&self, capability: &AccessCapability) -> ShareResult<String> {
        let payload = Payload {
            k: capability.object_key.clone(),
            iat: capability.issued_at.timestamp(),
            exp: capability.expires_at.timestamp(),
            n: capability.nonce.clone(),
        };
        let json = serde_json::to_vec(&payload).map_err(|e| ShareError::Internal(e.to_string()))?;
        let body = URL_SAFE_NO_PAD.encode(json);
        let tag = URL_SAFE_NO_PAD.encode(self.mac(body.as_bytes()));
        Ok(format!("{}.{}", body, tag))
    }

    /// Verify a token's signature and decode it. Expiry is not checked here.
    pub fn decode(&self, token: &str) -> ShareResult<AccessCapability> {
        let (body, tag) = token.split_once('.').ok_or(ShareError::InvalidCapability)?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag)
            .map_err(|_| ShareError::InvalidCapability)?;

        let expected = self.mac(body.as_bytes());
        if !bool::from(expected.as_slice().ct_eq(tag.as_slice())) {
            return Err(ShareError::InvalidCapability);
        }

        let json = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|_| ShareError::InvalidCapability)?;
        let payload: Payload =
            serde_json::from_slice(&json).map_err(|_| ShareError::InvalidCapability)?;

        let issued_at = Utc
            .timestamp_opt(payload.iat, 0)
            .single()
            .ok_or(ShareError::InvalidCapability)?;
        let expires_at = Utc
            .timestamp_opt(payload.exp, 0)
            .single()
            .ok_or(ShareError::InvalidCapability)?;

        Ok(AccessCapability {
            object_key: payload.k,
            issued_at,
            expires_at,
            nonce: payload.n,
        })
    }

    fn mac(&self, message: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
        mac.update(message);
        mac.finalize().into_bytes().to_vec()
    }
}
