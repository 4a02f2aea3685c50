//! Competitive/social and statistics surfaces.
//!
//! Leaderboard and challenge listing are denied for accounts restricted to
//! exercises-only scope; statistics and badge reads stay reachable. Badge
//! statistics flow through the read-through cache.

use std::sync::Arc;

use axum::{
    extract::Extension, http::StatusCode, response::IntoResponse, routing::get, Json, Router,
};
use serde_json::json;

use kata_auth::Surface;
use kata_core::CoreError;

use crate::app::{errors, services::AppServices};
use crate::context::IdentityContext;

pub fn router() -> Router {
    Router::new()
        .route("/leaderboard", get(leaderboard))
        .route("/challenges", get(challenges))
        .route("/badges/stats", get(badge_stats))
        .route("/stats", get(statistics))
}

/// GET /leaderboard - denied under exercises-only scope.
pub async fn leaderboard(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<IdentityContext>,
) -> axum::response::Response {
    match services.identity.leaderboard(identity.claims()).await {
        Ok(entries) => (StatusCode::OK, Json(json!({ "entries": entries }))).into_response(),
        Err(e) => errors::error_response(e),
    }
}

/// GET /challenges - denied under exercises-only scope.
pub async fn challenges(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<IdentityContext>,
) -> axum::response::Response {
    match services.identity.challenges(identity.claims()).await {
        Ok(challenges) => {
            (StatusCode::OK, Json(json!({ "challenges": challenges }))).into_response()
        }
        Err(e) => errors::error_response(e),
    }
}

/// GET /badges/stats - aggregate numbers served through the TTL cache; a
/// non-authoritative read, reachable under the restricted scope.
pub async fn badge_stats(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<IdentityContext>,
) -> axum::response::Response {
    if let Err(e) = services
        .identity
        .ensure_surface(identity.username(), Surface::Badges)
        .await
    {
        return errors::error_response(e);
    }

    let store = services.store.clone();
    let stats = services
        .badge_stats
        .get_or_compute("badge_stats", || async move {
            store
                .badge_statistics()
                .await
                .map_err(|e| CoreError::internal(e.to_string()))
        })
        .await;

    match stats {
        Ok(stats) => (StatusCode::OK, Json(json!({ "badges": stats }))).into_response(),
        Err(e) => errors::error_response(e),
    }
}

/// GET /stats - the caller's own numbers; reachable under the restricted
/// scope.
pub async fn statistics(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<IdentityContext>,
) -> axum::response::Response {
    match services.identity.statistics(identity.claims()).await {
        Ok(stats) => (StatusCode::OK, Json(json!({ "stats": stats }))).into_response(),
        Err(e) => errors::error_response(e),
    }
}
