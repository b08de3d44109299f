//! sharelink - signed download links with owner revocation
//!
//! Uploads are validated, written to an object store under a unique key and
//! recorded in a ledger. Owners hand out time-limited capability links and
//! can revoke an object at any time; every link resolution re-checks the
//! ledger, so revocation takes effect immediately.

pub mod auth;
pub mod cli;
pub mod config;
pub mod http_server;
pub mod observability;
pub mod sharing;
pub mod store;
