use kata_auth::TokenClaims;

/// Authenticated identity for a request (decoded access-token claims).
///
/// Inserted by the auth middleware; present on every protected route.
#[derive(Debug, Clone)]
pub struct IdentityContext {
    claims: TokenClaims,
}

impl IdentityContext {
    pub fn new(claims: TokenClaims) -> Self {
        Self { claims }
    }

    pub fn claims(&self) -> &TokenClaims {
        &self.claims
    }

    pub fn username(&self) -> &str {
        &self.claims.sub
    }
}
