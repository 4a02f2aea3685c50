//! HTTP application wiring (Axum router + service wiring).
//!
//! Layout:
//! - `services.rs`: infrastructure wiring (store selection, identity service,
//!   badge-stats cache)
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs and input validation
//! - `errors.rs`: consistent typed-outcome → status-code mapping

use std::sync::Arc;

use axum::{Extension, Router};
use tower_cookies::CookieManagerLayer;

use kata_auth::TokenIssuer;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Process configuration, read from the environment by `main.rs`.
pub struct ApiConfig {
    pub jwt_secret: String,
    /// Absent selects the in-memory store (dev/tests).
    pub database_url: Option<String>,
}

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: ApiConfig) -> Router {
    let issuer = Arc::new(TokenIssuer::new(config.jwt_secret.as_bytes()));
    let services = Arc::new(services::build_services(
        issuer.clone(),
        config.database_url.as_deref(),
    ));
    build_router(services)
}

/// Assemble the router from prebuilt services (black-box tests construct the
/// services with a seeded in-memory store and call this directly).
pub fn build_router(services: Arc<AppServices>) -> Router {
    let auth_state = middleware::AuthState {
        issuer: services.issuer.clone(),
    };

    // Protected routes: require a valid access token.
    let protected = routes::protected_router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    routes::public_router()
        .merge(protected)
        .layer(Extension(services))
        .layer(CookieManagerLayer::new())
}
