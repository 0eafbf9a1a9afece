//! Audit event model - append-only operational log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Audit event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    UserLogin,
    UserLoginFailed,
    IntegrityRecalculationStarted,
    IntegrityRecalculationCompleted,
    IntegrityRecalculationFailed,
    IntegrityVerified,
    PermissionCreated,
    PermissionUpdated,
    PermissionDeleted,
    UserPermissionsAssigned,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::UserLogin => "user_login",
            AuditEventType::UserLoginFailed => "user_login_failed",
            AuditEventType::IntegrityRecalculationStarted => "integrity_recalculation_started",
            AuditEventType::IntegrityRecalculationCompleted => {
                "integrity_recalculation_completed"
            }
            AuditEventType::IntegrityRecalculationFailed => "integrity_recalculation_failed",
            AuditEventType::IntegrityVerified => "integrity_verified",
            AuditEventType::PermissionCreated => "permission_created",
            AuditEventType::PermissionUpdated => "permission_updated",
            AuditEventType::PermissionDeleted => "permission_deleted",
            AuditEventType::UserPermissionsAssigned => "user_permissions_assigned",
        }
    }
}

/// Audit event entity.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub actor: Option<String>,
    pub event_type_code: String,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub event_data: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
}

impl AuditEvent {
    /// Create an event performed by an authenticated user.
    pub fn user_action(
        actor: impl Into<String>,
        event_type: AuditEventType,
        target_type: Option<&str>,
        target_id: Option<String>,
        event_data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            actor: Some(actor.into()),
            event_type_code: event_type.as_str().to_string(),
            target_type: target_type.map(str::to_string),
            target_id,
            event_data,
            created_utc: Utc::now(),
        }
    }

    /// Create a system-level audit event (no actor).
    pub fn system_action(
        event_type: AuditEventType,
        target_type: Option<&str>,
        event_data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            actor: None,
            event_type_code: event_type.as_str().to_string(),
            target_type: target_type.map(str::to_string),
            target_id: None,
            event_data,
            created_utc: Utc::now(),
        }
    }

    /// Attach the acting user, if known.
    pub fn with_actor(mut self, actor: Option<String>) -> Self {
        self.actor = actor;
        self
    }

    pub fn is(&self, event_type: AuditEventType) -> bool {
        self.event_type_code == event_type.as_str()
    }
}
