//! Signed access/refresh token issuance and validation.
//!
//! Both token kinds are HS256-signed with one shared secret. Validation
//! re-verifies the signature and expiry and checks that the embedded kind
//! matches what the calling context expects, so an access token can never
//! stand in for a refresh token or vice versa. Every decode failure collapses
//! to the same `None`: callers cannot tell a bad signature from an expired
//! token from a malformed payload.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::role::Role;

/// Default lifetime of an access token.
pub const ACCESS_TTL_MINUTES: i64 = 15;

/// Default lifetime of a refresh token.
pub const REFRESH_TTL_DAYS: i64 = 7;

/// Kind discriminator embedded in every token.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims carried by both token kinds. Transient: produced at issuance,
/// consumed at validation, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: the account's username.
    pub sub: String,

    /// Role at issuance time. A role change takes effect on the next login.
    pub role: Role,

    /// Token kind, `"type"` on the wire.
    #[serde(rename = "type")]
    pub kind: TokenKind,

    /// Expiry as unix seconds.
    pub exp: i64,
}

/// An access/refresh pair minted on successful authentication.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token signing failed")]
    SigningFailed,
}

/// Issues and validates signed tokens with one shared secret and algorithm.
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    /// Create an issuer with the default access/refresh lifetimes.
    pub fn new(secret: &[u8]) -> Self {
        Self::with_ttls(
            secret,
            Duration::minutes(ACCESS_TTL_MINUTES),
            Duration::days(REFRESH_TTL_DAYS),
        )
    }

    /// Create an issuer with explicit lifetimes (tests use short or negative
    /// lifetimes to exercise expiry).
    pub fn with_ttls(secret: &[u8], access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl,
            refresh_ttl,
        }
    }

    /// Refresh-token lifetime; the refresh cookie's Max-Age must match it.
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    pub fn issue_access(&self, username: &str, role: Role) -> Result<String, TokenError> {
        self.issue(username, role, TokenKind::Access)
    }

    pub fn issue_refresh(&self, username: &str, role: Role) -> Result<String, TokenError> {
        self.issue(username, role, TokenKind::Refresh)
    }

    /// Mint the access+refresh pair returned by a successful login.
    pub fn issue_pair(&self, username: &str, role: Role) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access: self.issue_access(username, role)?,
            refresh: self.issue_refresh(username, role)?,
        })
    }

    fn issue(&self, username: &str, role: Role, kind: TokenKind) -> Result<String, TokenError> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = TokenClaims {
            sub: username.to_string(),
            role,
            kind,
            exp: (Utc::now() + ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|_| TokenError::SigningFailed)
    }

    /// Decode and validate a token, requiring the given kind.
    ///
    /// Bad signature, malformed payload, expired `exp`, and a kind mismatch
    /// all return `None`; no distinction leaks to the caller.
    pub fn decode(&self, token: &str, expected: TokenKind) -> Option<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<TokenClaims>(token, &self.decoding, &validation).ok()?;
        if data.claims.kind != expected {
            return None;
        }
        Some(data.claims)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
