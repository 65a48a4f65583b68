use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};

use crate::error::{ApiResponse, Result};
use crate::models::{
    CreateUserRequest, CurrentUser, LoginRequest, UserResponse, Verify2faRequest,
};
use crate::services::AuthService;
use crate::AppState;

/// Register a new user; always responds with a 2FA challenge
/// POST /api/v1/users
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse> {
    let res = AuthService::signup(&state.db, state.mailer.as_ref(), req).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(res))))
}

/// Login; issues a session directly for trusted devices, otherwise
/// sends a verification code
/// POST /api/v1/users/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse> {
    let outcome = AuthService::login(&state.db, state.mailer.as_ref(), &state.config, req).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

/// Complete 2FA with the emailed code
/// POST /api/v1/users/verify-2fa
pub async fn verify_2fa(
    State(state): State<AppState>,
    Json(req): Json<Verify2faRequest>,
) -> Result<impl IntoResponse> {
    let res = AuthService::verify_2fa(&state.db, &state.config, req).await?;
    Ok(Json(ApiResponse::success(res)))
}

/// Current user profile
/// GET /api/v1/users/me
pub async fn me(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<UserResponse>>> {
    let user: crate::models::User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&current_user.id)
        .fetch_one(state.db.pool())
        .await?;

    Ok(Json(ApiResponse::success(UserResponse::from(user))))
}
