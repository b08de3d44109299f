//! # Sharing
//!
//! Upload gatekeeping, the object ledger, capability issuance and
//! revocation. [`ShareService`] wires the pieces together over one ledger
//! and one object store.

pub mod capability;
pub mod errors;
pub mod gatekeeper;
pub mod issuer;
pub mod ledger;
pub mod resolver;
pub mod retry;
pub mod revocation;
pub mod service;

pub use capability::{AccessCapability, CapabilitySigner};
pub use errors::{Rejection, ShareError, ShareResult};
pub use gatekeeper::{sanitize_filename, UploadPolicy, ValidatedUpload, DEFAULT_CONTENT_TYPE};
pub use issuer::{clamp_ttl, CapabilityIssuer, IssuedCapability};
pub use ledger::{FileLedger, Ledger, MemoryLedger, RevokeOutcome, StoredObject};
pub use resolver::{CapabilityResolver, ResolvedObject};
pub use retry::RetryPolicy;
pub use revocation::{RevocationEngine, RevocationReceipt};
pub use service::{ObjectDetails, ShareService, ShareSettings, UploadReceipt};
