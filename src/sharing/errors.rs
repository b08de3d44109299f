//! # Sharing Errors

use thiserror::Error;

use crate::store::StoreError;

/// Result type for sharing operations
pub type ShareResult<T> = Result<T, ShareError>;

/// Why the gatekeeper turned an upload away
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("file name is empty after sanitization")]
    EmptyFilename,

    #[error("file name has no extension")]
    MissingExtension,

    #[error("file type not allowed: .{0}")]
    ExtensionNotAllowed(String),

    #[error("file too large: {size} bytes (max: {max})")]
    TooLarge { size: u64, max: u64 },

    #[error("file is empty")]
    EmptyFile,

    #[error("invalid content type: {0}")]
    InvalidContentType(String),

    #[error("content type not allowed: {0}")]
    ContentTypeNotAllowed(String),
}

/// Sharing errors
#[derive(Debug, Clone, Error)]
pub enum ShareError {
    // User-correctable
    #[error("upload rejected: {0}")]
    Validation(#[from] Rejection),

    // Lookup / authorization
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("actor {actor} may not manage object {object_key}")]
    Forbidden { object_key: String, actor: String },

    #[error("object key already recorded: {0}")]
    Conflict(String),

    // Capability failures
    #[error("object has been revoked: {0}")]
    Revoked(String),

    #[error("link expired for object {0}")]
    Expired(String),

    #[error("invalid link")]
    InvalidCapability,

    // Backends
    #[error("object store failure for {object_key}: {source}")]
    Upstream {
        object_key: String,
        #[source]
        source: StoreError,
    },

    #[error("ledger failure: {0}")]
    Ledger(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ShareError {
    pub(crate) fn upstream(object_key: &str, source: StoreError) -> Self {
        ShareError::Upstream {
            object_key: object_key.to_string(),
            source,
        }
    }

    /// HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            ShareError::Validation(Rejection::TooLarge { .. }) => 413,
            ShareError::Validation(_) => 400,
            ShareError::NotFound(_) => 404,
            ShareError::Forbidden { .. } => 403,
            ShareError::Conflict(_) => 409,
            ShareError::Revoked(_) => 410,
            ShareError::Expired(_) => 403,
            ShareError::InvalidCapability => 403,
            ShareError::Upstream { source, .. } if source.is_transient() => 502,
            ShareError::Upstream { .. } => 500,
            ShareError::Ledger(_) => 500,
            ShareError::Internal(_) => 500,
        }
    }

    /// The object the failure concerns, for audit records
    pub fn object_key(&self) -> Option<&str> {
        match self {
            ShareError::NotFound(key)
            | ShareError::Conflict(key)
            | ShareError::Revoked(key)
            | ShareError::Expired(key) => Some(key),
            ShareError::Forbidden { object_key, .. } | ShareError::Upstream { object_key, .. } => {
                Some(object_key)
            }
            _ => None,
        }
    }

    /// Message safe to show end users. Backend details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            ShareError::Validation(rejection) => rejection.to_string(),
            ShareError::NotFound(_) => "object not found".to_string(),
            ShareError::Forbidden { .. } => "not permitted to manage this object".to_string(),
            ShareError::Conflict(_) => "upload collided with an existing object, retry".to_string(),
            ShareError::Revoked(_) => "access to this object has been revoked".to_string(),
            ShareError::Expired(_) => "link expired".to_string(),
            ShareError::InvalidCapability => "invalid link".to_string(),
            ShareError::Upstream { source, .. } if source.is_transient() => {
                "storage temporarily unavailable".to_string()
            }
            ShareError::Upstream { .. } | ShareError::Ledger(_) | ShareError::Internal(_) => {
                "internal error".to_string()
            }
        }
    }
}
