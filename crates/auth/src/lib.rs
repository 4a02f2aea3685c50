//! `kata-auth` — pure authentication/authorization boundary (zero-trust).
//!
//! This crate is intentionally decoupled from HTTP and storage: credential
//! hashing, token issuance/validation, access-scope resolution, and the role
//! permission matrix are all deterministic functions over their inputs.

pub mod credential;
pub mod permission;
pub mod role;
pub mod scope;
pub mod token;

pub use credential::{hash_password, verify_password, CredentialError};
pub use permission::{authorize, Action, Ownership};
pub use role::Role;
pub use scope::{ensure_reachable, AccessScope, Surface, GRACE_PERIOD_MINUTES};
pub use token::{TokenClaims, TokenIssuer, TokenKind, TokenPair};
