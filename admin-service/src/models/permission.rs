//! Permission hierarchy model - leaf capabilities and composite groups.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::FromRow;

use crate::permissions::codec;

/// A node of the permission hierarchy.
///
/// `id == 0` marks a node that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionNode {
    /// Terminal, directly grantable capability.
    Leaf { id: i64, name: String },
    /// Named group of child permissions granted together.
    Composite {
        id: i64,
        name: String,
        children: Vec<PermissionNode>,
    },
}

impl PermissionNode {
    pub fn leaf(id: i64, name: impl Into<String>) -> Self {
        PermissionNode::Leaf {
            id,
            name: name.into(),
        }
    }

    pub fn composite(id: i64, name: impl Into<String>, children: Vec<PermissionNode>) -> Self {
        PermissionNode::Composite {
            id,
            name: name.into(),
            children,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            PermissionNode::Leaf { id, .. } | PermissionNode::Composite { id, .. } => *id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            PermissionNode::Leaf { name, .. } | PermissionNode::Composite { name, .. } => name,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, PermissionNode::Composite { .. })
    }

    /// Whether this node already exists in storage.
    pub fn is_persisted(&self) -> bool {
        self.id() > 0
    }

    pub fn with_id(self, id: i64) -> Self {
        match self {
            PermissionNode::Leaf { name, .. } => PermissionNode::Leaf { id, name },
            PermissionNode::Composite { name, children, .. } => {
                PermissionNode::Composite { id, name, children }
            }
        }
    }

    /// Direct children; empty for leaves.
    pub fn children(&self) -> &[PermissionNode] {
        match self {
            PermissionNode::Leaf { .. } => &[],
            PermissionNode::Composite { children, .. } => children,
        }
    }
}

impl Serialize for PermissionNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        codec::to_document(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PermissionNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let doc = serde_json::Value::deserialize(deserializer)?;
        codec::parse(&doc).map_err(serde::de::Error::custom)
    }
}

/// Persisted permission row, without its containment edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PermissionRecord {
    pub id: i64,
    pub name: String,
    pub is_composite: bool,
}

/// Persisted containment edge: `parent_id` contains `child_id` at `position`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PermissionEdge {
    pub parent_id: i64,
    pub child_id: i64,
    pub position: i32,
}

/// A user's held permission roots and the leaf names they resolve to.
#[derive(Debug, Clone, Serialize)]
pub struct UserPermissions {
    pub user_id: i64,
    pub roots: Vec<PermissionNode>,
    pub effective: Vec<String>,
    pub resolved_utc: DateTime<Utc>,
}
