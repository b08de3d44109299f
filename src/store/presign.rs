//! # Presigned URL Signing
//!
//! Store-level presigned reads for [`LocalObjectStore`](super::LocalObjectStore).
//! The signature covers the object key and the expiry timestamp, so neither
//! can be altered without invalidating the URL.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::errors::{StoreError, StoreResult};

type HmacSha256 = Hmac<Sha256>;

/// Longest lifetime a presigned URL may carry (seven days, as S3 allows)
pub const MAX_PRESIGN_TTL_SECONDS: u64 = 7 * 24 * 60 * 60;

/// A presigned GET URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// HMAC-SHA256 signer for store URLs
#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner").finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            secret: secret.to_vec(),
        }
    }

    /// Sign `key` for reads until `now + ttl_seconds`, rooted at `base_url`.
    /// The lifetime is capped at [`MAX_PRESIGN_TTL_SECONDS`].
    pub fn presign(
        &self,
        base_url: &str,
        key: &str,
        ttl_seconds: u64,
        now: DateTime<Utc>,
    ) -> PresignedUrl {
        let expires_at = now + Duration::seconds(ttl_seconds.min(MAX_PRESIGN_TTL_SECONDS) as i64);
        let expires = expires_at.timestamp();
        let signature = self.sign(key, expires);

        PresignedUrl {
            url: format!(
                "{}/blobs/{}?expires={}&signature={}",
                base_url.trim_end_matches('/'),
                utf8_percent_encode(key, NON_ALPHANUMERIC),
                expires,
                signature
            ),
            expires_at,
        }
    }

    /// Check a presigned request. Expired and tampered URLs are both
    /// permission failures.
    pub fn verify(&self, key: &str, expires: i64, signature: &str, now: DateTime<Utc>) -> StoreResult<()> {
        let expires_at = Utc
            .timestamp_opt(expires, 0)
            .single()
            .ok_or_else(|| StoreError::PermissionDenied(key.to_string()))?;
        if now >= expires_at {
            return Err(StoreError::PermissionDenied(key.to_string()));
        }

        let expected = self.sign(key, expires);
        if bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
            Ok(())
        } else {
            Err(StoreError::PermissionDenied(key.to_string()))
        }
    }

    fn sign(&self, key: &str, expires: i64) -> String {
        // new_from_slice accepts keys of any length for HMAC
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }
}
