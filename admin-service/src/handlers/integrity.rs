use axum::{extract::State, http::StatusCode, Json};
use serde_json::json;
use service_core::error::AppError;

use crate::{
    dtos::integrity::RecalculationAccepted,
    middleware::{claims, AuthUser},
    models::{AuditEvent, AuditEventType, IntegrityReport},
    AppState,
};

/// `POST /integrity/recalculate`: start a background sweep and return at once.
///
/// The outcome is only written to the audit log.
pub async fn recalculate(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<(StatusCode, Json<RecalculationAccepted>), AppError> {
    user.require(claims::INTEGRITY_RECALCULATE)?;

    state
        .integrity
        .trigger_recalculation(Some(user.username().to_string()))?;

    tracing::info!(user = %user.username(), "Integrity recalculation accepted");
    Ok((StatusCode::ACCEPTED, Json(RecalculationAccepted::now())))
}

/// `GET /integrity/verify`
pub async fn verify(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<IntegrityReport>, AppError> {
    user.require(claims::INTEGRITY_VERIFY)?;

    let report = state.integrity.verify_all().await;

    let event = AuditEvent::user_action(
        user.username(),
        AuditEventType::IntegrityVerified,
        Some("integrity"),
        None,
        Some(json!({
            "valid": report.valid,
            "violations": report.violations.len(),
            "errors": report.errors.len(),
        })),
    );
    if let Err(e) = state.audit.record(event).await {
        tracing::error!(error = %e, "Failed to write verification audit event");
    }

    Ok(Json(report))
}
