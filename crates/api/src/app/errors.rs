use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use kata_core::CoreError;

/// Map a typed core outcome to a status code + `{error, message}` body.
///
/// Internal detail is logged and replaced with a generic body; everything else
/// carries its message through.
pub fn error_response(err: CoreError) -> axum::response::Response {
    match err {
        CoreError::Authentication => json_error(
            StatusCode::UNAUTHORIZED,
            "authentication_failed",
            "authentication failed",
        ),
        CoreError::Authorization(msg) => json_error(StatusCode::FORBIDDEN, "forbidden", msg),
        CoreError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        CoreError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        CoreError::Internal(detail) => {
            tracing::error!(detail = %detail, "internal error");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal error",
            )
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
