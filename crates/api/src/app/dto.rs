use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use kata_auth::Role;
use kata_infra::IdentitySnapshot;

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct RequestPasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct CreateExerciseRequest {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateExerciseRequest {
    pub title: String,
}

/// Shape checks for registration input. Uniqueness is the core's concern;
/// this only rejects requests that could never be valid.
pub fn validate_registration(req: &RegisterRequest) -> Result<(), axum::response::Response> {
    if req.username.trim().is_empty() || req.username.len() > 64 {
        return Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "username must be 1-64 characters",
        ));
    }
    if !req.email.contains('@') {
        return Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "email is not valid",
        ));
    }
    validate_password(&req.password)
}

pub fn validate_password(password: &str) -> Result<(), axum::response::Response> {
    if password.len() < 8 {
        return Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "password must be at least 8 characters",
        ));
    }
    Ok(())
}

// -------------------------
// Response DTOs
// -------------------------

/// Login body: the access token plus the user view. The refresh token is
/// cookie-only by design and must never be added here.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub user: IdentitySnapshot,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}
