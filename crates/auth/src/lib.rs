//! `farmstand-auth` — session-token boundary for the API layer.
//!
//! The wallet handshake that mints session tokens is an external
//! collaborator; this crate only verifies tokens and validates their claims.
//! It is intentionally decoupled from HTTP and storage.

pub mod claims;
pub mod validator;

pub use claims::{SessionClaims, TokenValidationError, validate_claims};
pub use validator::{Hs256JwtValidator, JwtValidator};
