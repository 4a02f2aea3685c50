//! Account administration: listing, role changes, hard deletion.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, put},
    Json, Router,
};
use serde_json::json;

use kata_core::AccountId;

use crate::app::{dto, errors, services::AppServices};
use crate::context::IdentityContext;

pub fn router() -> Router {
    Router::new()
        .route("/accounts", get(list))
        .route("/accounts/:id/role", put(set_role))
        .route("/accounts/:id", delete(remove))
}

/// GET /accounts - moderators and admins only.
pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<IdentityContext>,
) -> axum::response::Response {
    match services.identity.list_accounts(identity.claims()).await {
        Ok(accounts) => (StatusCode::OK, Json(json!({ "accounts": accounts }))).into_response(),
        Err(e) => errors::error_response(e),
    }
}

/// PUT /accounts/:id/role - admins only.
pub async fn set_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<IdentityContext>,
    Path(id): Path<String>,
    Json(req): Json<dto::SetRoleRequest>,
) -> axum::response::Response {
    let id: AccountId = match id.parse() {
        Ok(id) => id,
        Err(e) => return errors::error_response(e),
    };

    match services.identity.set_role(identity.claims(), id, req.role).await {
        Ok(()) => (StatusCode::OK, Json(dto::SuccessResponse::ok())).into_response(),
        Err(e) => errors::error_response(e),
    }
}

/// DELETE /accounts/:id - the owner, or an admin for anyone; cascades across
/// every dependent table or commits nothing.
pub async fn remove(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<IdentityContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: AccountId = match id.parse() {
        Ok(id) => id,
        Err(e) => return errors::error_response(e),
    };

    match services.identity.delete_account(identity.claims(), id).await {
        Ok(()) => (StatusCode::OK, Json(dto::SuccessResponse::ok())).into_response(),
        Err(e) => errors::error_response(e),
    }
}
