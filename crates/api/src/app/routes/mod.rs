use axum::{routing::get, Router};

pub mod accounts;
pub mod auth;
pub mod exercises;
pub mod social;
pub mod system;

/// Routes reachable without an access token.
pub fn public_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .nest("/auth", auth::public_router())
}

/// Routes behind the auth middleware.
pub fn protected_router() -> Router {
    Router::new()
        .nest("/auth", auth::session_router())
        .merge(accounts::router())
        .merge(exercises::router())
        .merge(social::router())
}
