//! Registration, login, token refresh, logout, and self-service account
//! operations.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use tower_cookies::Cookies;

use kata_core::CoreError;

use crate::app::{dto, errors, services::AppServices};
use crate::context::IdentityContext;
use crate::cookie;

pub fn public_router() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/request-password-reset", post(request_password_reset))
        .route("/reset-password", post(reset_password))
}

pub fn session_router() -> Router {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/verify-email", post(verify_email))
        .route("/password", put(change_password))
}

/// POST /auth/register
pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<dto::RegisterRequest>,
) -> axum::response::Response {
    if let Err(resp) = dto::validate_registration(&req) {
        return resp;
    }

    match services
        .identity
        .register(&req.username, &req.email, &req.password)
        .await
    {
        Ok(user) => (StatusCode::CREATED, Json(json!({ "user": user }))).into_response(),
        Err(e) => errors::error_response(e),
    }
}

/// POST /auth/login - verify credentials, set the refresh cookie, return the
/// access token and the user view in the body.
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    cookies: Cookies,
    Json(req): Json<dto::LoginRequest>,
) -> axum::response::Response {
    match services.identity.login(&req.username, &req.password).await {
        Ok(outcome) => {
            cookie::set_refresh_cookie(
                &cookies,
                outcome.tokens.refresh,
                services.issuer.refresh_ttl(),
            );
            (
                StatusCode::OK,
                Json(dto::LoginResponse {
                    access_token: outcome.tokens.access,
                    user: outcome.user,
                }),
            )
                .into_response()
        }
        Err(e) => errors::error_response(e),
    }
}

/// POST /auth/refresh - the refresh token is accepted from the session cookie
/// and nowhere else. No cookie means failure before any decoding is attempted.
pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    cookies: Cookies,
) -> axum::response::Response {
    let Some(refresh_cookie) = cookies.get(cookie::REFRESH_COOKIE) else {
        return errors::error_response(CoreError::Authentication);
    };
    let refresh_token = refresh_cookie.value().to_string();

    match services.identity.refresh(&refresh_token) {
        Ok(access_token) => {
            // The refresh token is not rotated; re-setting keeps the cookie's
            // Max-Age aligned with the token it carries.
            cookie::set_refresh_cookie(&cookies, refresh_token, services.issuer.refresh_ttl());
            (StatusCode::OK, Json(dto::TokenResponse { access_token })).into_response()
        }
        Err(e) => errors::error_response(e),
    }
}

/// POST /auth/logout - clear the refresh cookie with matching attributes.
pub async fn logout(cookies: Cookies) -> axum::response::Response {
    cookie::clear_refresh_cookie(&cookies);
    (StatusCode::OK, Json(dto::SuccessResponse::ok())).into_response()
}

/// GET /auth/me - identity with a freshly resolved access scope.
pub async fn me(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<IdentityContext>,
) -> axum::response::Response {
    match services.identity.current_identity(identity.claims()).await {
        Ok(user) => (StatusCode::OK, Json(json!({ "user": user }))).into_response(),
        Err(e) => errors::error_response(e),
    }
}

/// POST /auth/verify-email - mark the caller's email verified. Delivery and
/// confirmation of the verification email happen outside this core.
pub async fn verify_email(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<IdentityContext>,
) -> axum::response::Response {
    match services.identity.verify_email(identity.claims()).await {
        Ok(user) => (StatusCode::OK, Json(json!({ "user": user }))).into_response(),
        Err(e) => errors::error_response(e),
    }
}

/// PUT /auth/password
pub async fn change_password(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<IdentityContext>,
    Json(req): Json<dto::ChangePasswordRequest>,
) -> axum::response::Response {
    if let Err(resp) = dto::validate_password(&req.new_password) {
        return resp;
    }

    match services
        .identity
        .change_password(identity.claims(), &req.current_password, &req.new_password)
        .await
    {
        Ok(()) => (StatusCode::OK, Json(dto::SuccessResponse::ok())).into_response(),
        Err(e) => errors::error_response(e),
    }
}

/// POST /auth/request-password-reset - always answers success; the token goes
/// out through the mail collaborator, never through this response.
pub async fn request_password_reset(
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<dto::RequestPasswordResetRequest>,
) -> axum::response::Response {
    match services.identity.request_password_reset(&req.email).await {
        Ok(_token) => (StatusCode::OK, Json(dto::SuccessResponse::ok())).into_response(),
        Err(e) => errors::error_response(e),
    }
}

/// POST /auth/reset-password
pub async fn reset_password(
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<dto::ResetPasswordRequest>,
) -> axum::response::Response {
    if let Err(resp) = dto::validate_password(&req.new_password) {
        return resp;
    }

    match services
        .identity
        .reset_password(&req.token, &req.new_password)
        .await
    {
        Ok(()) => (StatusCode::OK, Json(dto::SuccessResponse::ok())).into_response(),
        Err(e) => errors::error_response(e),
    }
}
