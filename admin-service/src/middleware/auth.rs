use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::{dtos::ErrorResponse, services::SessionClaims, AppState};

/// Leaf permission names checked by the admin endpoints.
pub mod claims {
    pub const INTEGRITY_RECALCULATE: &str = "integrity.recalculate";
    pub const INTEGRITY_VERIFY: &str = "integrity.verify";
    pub const PERMISSIONS_MANAGE: &str = "permissions.manage";
}

/// Require a valid bearer session token and expose its claims to handlers.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| unauthorized("Missing or invalid Authorization header"))?;

    let claims = state.jwt.validate(token).map_err(|e| {
        tracing::debug!(error = %e, "Rejected session token");
        unauthorized("Invalid or expired token")
    })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

fn unauthorized(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

/// Claims of the authenticated caller.
pub struct AuthUser(pub SessionClaims);

impl AuthUser {
    /// Claim membership against the token's snapshot of leaf permissions.
    pub fn require(&self, claim: &str) -> Result<(), AppError> {
        if self.0.has_role(claim) {
            return Ok(());
        }
        tracing::warn!(
            user = %self.0.username,
            required_claim = claim,
            "Insufficient permissions"
        );
        Err(AppError::Forbidden(anyhow::anyhow!(
            "Missing required permission: {}",
            claim
        )))
    }

    pub fn username(&self) -> &str {
        &self.0.username
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts.extensions.get::<SessionClaims>().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Auth claims missing from request extensions".to_string(),
            }),
        ))?;

        Ok(AuthUser(claims.clone()))
    }
}
