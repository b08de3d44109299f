//! # HTTP Server Module
//!
//! Axum server exposing the share API.
//!
//! # Endpoints
//!
//! - `/health` - Health check
//! - `POST /upload` - Upload a file and receive a download link (rate limited)
//! - `GET /objects`, `GET /objects/:object_key` - Owner views
//! - `POST /objects/:object_key/links` - Mint another link
//! - `POST /revoke/:object_key` - Revoke every link to an object
//! - `GET /files/:token` - Resolve a download link
//! - `GET /blobs/*key` - Presigned reads from the local store

pub mod config;
pub mod health_routes;
pub mod ratelimit;
pub mod server;
pub mod share_routes;

pub use config::HttpServerConfig;
pub use ratelimit::{RateLimitConfig, RateLimitLayer, RateLimiter};
pub use server::{build_state, HttpServer};
pub use share_routes::{share_routes, ShareState};
