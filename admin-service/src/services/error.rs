use service_core::error::AppError;
use thiserror::Error;

use crate::permissions::PermissionError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(anyhow::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User is blocked")]
    UserBlocked,

    #[error(transparent)]
    Permission(#[from] PermissionError),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Database(e) => AppError::DatabaseError(e),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid credentials"))
            }
            ServiceError::UserBlocked => AppError::Forbidden(anyhow::anyhow!("User is blocked")),
            ServiceError::Permission(e) => e.into(),
        }
    }
}
