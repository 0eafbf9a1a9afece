use axum::{extract::State, Json};
use service_core::error::AppError;
use validator::Validate;

use crate::{dtos::auth::LoginRequest, services::TokenResponse, AppState};

/// `POST /auth/login`
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    req.validate()?;
    let token = state.auth.login(req).await?;
    Ok(Json(token))
}
