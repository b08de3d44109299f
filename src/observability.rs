//! Logging and audit trail
//!
//! Logs go through `tracing`. Share actions additionally emit one audit
//! event each on the `audit` target, always carrying the object key and
//! actor when known, so a log pipeline can route them separately.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Human-readable, for local runs
    Pretty,
}

/// Install the global subscriber. `RUST_LOG` wins over `default_filter`.
/// Calling this twice is harmless; the second call is ignored.
pub fn init_tracing(format: LogFormat, default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let _ = match format {
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
        LogFormat::Pretty => builder.try_init(),
    };
}

/// Audited share actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    UploadRecorded,
    UploadRejected,
    LinkIssued,
    LinkRejected,
    ObjectRevoked,
    RevokeDenied,
    FetchServed,
    FetchDenied,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::UploadRecorded => "UPLOAD_RECORDED",
            AuditAction::UploadRejected => "UPLOAD_REJECTED",
            AuditAction::LinkIssued => "LINK_ISSUED",
            AuditAction::LinkRejected => "LINK_REJECTED",
            AuditAction::ObjectRevoked => "OBJECT_REVOKED",
            AuditAction::RevokeDenied => "REVOKE_DENIED",
            AuditAction::FetchServed => "FETCH_SERVED",
            AuditAction::FetchDenied => "FETCH_DENIED",
        }
    }

    /// Denials are logged at WARN, everything else at INFO
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            AuditAction::UploadRejected
                | AuditAction::LinkRejected
                | AuditAction::RevokeDenied
                | AuditAction::FetchDenied
        )
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Emit an audit event
pub fn audit(action: AuditAction, object_key: Option<&str>, actor: Option<&str>, detail: &str) {
    let object_key = object_key.unwrap_or("-");
    let actor = actor.unwrap_or("-");

    if action.is_denial() {
        tracing::warn!(
            target: "audit",
            action = action.as_str(),
            object_key,
            actor,
            detail,
            "share action"
        );
    } else {
        tracing::info!(
            target: "audit",
            action = action.as_str(),
            object_key,
            actor,
            detail,
            "share action"
        );
    }
}
