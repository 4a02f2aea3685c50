use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use kata_auth::{TokenIssuer, TokenKind};

use crate::context::IdentityContext;

#[derive(Clone)]
pub struct AuthState {
    pub issuer: Arc<TokenIssuer>,
}

/// Require a valid access token and attach the decoded identity to the
/// request. Any validation failure is a bare 401; no detail leaks.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = extract_bearer(req.headers())?;

    let claims = state
        .issuer
        .decode(token, TokenKind::Access)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(IdentityContext::new(claims));

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}
