//! Exercise metadata routes: browsing, authoring, archival, attempts.
//!
//! Exercise content itself is produced elsewhere; this core owns the
//! ownership/archival substrate the permission matrix needs.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;

use kata_core::ExerciseId;

use crate::app::{dto, errors, services::AppServices};
use crate::context::IdentityContext;

pub fn router() -> Router {
    Router::new()
        .route("/exercises", get(list).post(create))
        .route("/exercises/:id", put(update).delete(remove))
        .route("/exercises/:id/archive", post(archive))
        .route("/exercises/:id/attempts", post(attempt))
}

/// GET /exercises - reachable under the restricted scope.
pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<IdentityContext>,
) -> axum::response::Response {
    match services.identity.list_exercises(identity.claims()).await {
        Ok(exercises) => (StatusCode::OK, Json(json!({ "exercises": exercises }))).into_response(),
        Err(e) => errors::error_response(e),
    }
}

/// POST /exercises - authors and above.
pub async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<IdentityContext>,
    Json(req): Json<dto::CreateExerciseRequest>,
) -> axum::response::Response {
    match services
        .identity
        .create_exercise(identity.claims(), &req.title)
        .await
    {
        Ok(exercise) => {
            (StatusCode::CREATED, Json(json!({ "exercise": exercise }))).into_response()
        }
        Err(e) => errors::error_response(e),
    }
}

/// PUT /exercises/:id - creator (or moderator/admin) only.
pub async fn update(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<IdentityContext>,
    Path(id): Path<String>,
    Json(req): Json<dto::UpdateExerciseRequest>,
) -> axum::response::Response {
    let id: ExerciseId = match id.parse() {
        Ok(id) => id,
        Err(e) => return errors::error_response(e),
    };

    match services
        .identity
        .update_exercise(identity.claims(), id, &req.title)
        .await
    {
        Ok(exercise) => (StatusCode::OK, Json(json!({ "exercise": exercise }))).into_response(),
        Err(e) => errors::error_response(e),
    }
}

/// DELETE /exercises/:id - creator (or moderator/admin) only; hard delete.
pub async fn remove(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<IdentityContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ExerciseId = match id.parse() {
        Ok(id) => id,
        Err(e) => return errors::error_response(e),
    };

    match services.identity.delete_exercise(identity.claims(), id).await {
        Ok(()) => (StatusCode::OK, Json(dto::SuccessResponse::ok())).into_response(),
        Err(e) => errors::error_response(e),
    }
}

/// POST /exercises/:id/archive - moderators and admins; soft flag, attempts
/// referencing the exercise stay intact.
pub async fn archive(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<IdentityContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ExerciseId = match id.parse() {
        Ok(id) => id,
        Err(e) => return errors::error_response(e),
    };

    match services.identity.archive_exercise(identity.claims(), id).await {
        Ok(()) => (StatusCode::OK, Json(dto::SuccessResponse::ok())).into_response(),
        Err(e) => errors::error_response(e),
    }
}

/// POST /exercises/:id/attempts
pub async fn attempt(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<IdentityContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ExerciseId = match id.parse() {
        Ok(id) => id,
        Err(e) => return errors::error_response(e),
    };

    match services.identity.attempt_exercise(identity.claims(), id).await {
        Ok(()) => (StatusCode::CREATED, Json(dto::SuccessResponse::ok())).into_response(),
        Err(e) => errors::error_response(e),
    }
}
