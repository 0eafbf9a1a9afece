//! Hierarchical permission engine.
//!
//! Permissions form a DAG of leaf capabilities and composite groups. Every mutation is
//! validated and cycle-checked before anything is written, and a user's effective
//! authorization is the set of leaf names reachable from the roots they hold.

pub mod codec;
mod cycle_guard;
mod flatten;
mod graph;
mod service;
mod store;

pub use codec::CodecError;
pub use cycle_guard::CycleGuard;
pub use flatten::flatten_leaf_names;
pub use graph::PermissionGraph;
pub use service::PermissionService;
pub use store::{plan_save, AncestorOracle, InMemoryPermissionStore, PermissionStore, PlannedNode};

use service_core::error::AppError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CycleError {
    #[error("Permission '{name}' already appears on its own containment path")]
    SelfContainmentCycle { id: i64, name: String },

    #[error("Permission '{name}' lists itself as a child")]
    DirectSelfReference { id: i64, name: String },

    #[error(
        "Adding '{child_name}' (id {child_id}) under id {parent_id} would close a cycle through the existing hierarchy"
    )]
    WouldCreateCycleViaExistingHierarchy {
        parent_id: i64,
        child_id: i64,
        child_name: String,
    },
}

impl CycleError {
    /// Metric label for the rejection.
    pub fn reason(&self) -> &'static str {
        match self {
            CycleError::SelfContainmentCycle { .. } => "self_containment",
            CycleError::DirectSelfReference { .. } => "direct_self_reference",
            CycleError::WouldCreateCycleViaExistingHierarchy { .. } => "existing_hierarchy",
        }
    }
}

#[derive(Debug, Error)]
pub enum PermissionError {
    #[error("Invalid permission: {0}")]
    Validation(String),

    #[error("Invalid permission document: {0}")]
    Codec(#[from] CodecError),

    #[error("Permission cycle rejected: {0}")]
    Cycle(#[from] CycleError),

    #[error("Permission {0} not found")]
    NotFound(i64),

    #[error("Stored permission hierarchy is corrupt: {0}")]
    CorruptHierarchy(String),

    #[error("Permission store error: {0}")]
    Persistence(#[source] anyhow::Error),
}

impl From<PermissionError> for AppError {
    fn from(err: PermissionError) -> Self {
        match err {
            PermissionError::Validation(_) | PermissionError::Cycle(_) => {
                AppError::BadRequest(anyhow::anyhow!(err.to_string()))
            }
            PermissionError::Codec(_) => AppError::Unprocessable(anyhow::anyhow!(err.to_string())),
            PermissionError::NotFound(_) => AppError::NotFound(anyhow::anyhow!(err.to_string())),
            PermissionError::CorruptHierarchy(_) => AppError::InternalError(anyhow::Error::new(err)),
            PermissionError::Persistence(_) => AppError::DatabaseError(anyhow::Error::new(err)),
        }
    }
}
