//! # Auth Module
//!
//! Bearer JWT authentication. Handlers turn the `Authorization` header into
//! an [`Actor`] and pass it explicitly to every owner-scoped operation.

pub mod errors;
pub mod jwt;

pub use errors::{AuthError, AuthResult};
pub use jwt::{Actor, JwtClaims, JwtConfig, JwtManager};
