//! Permission hierarchy service - validated, cycle-checked mutations and user grants.

use chrono::Utc;
use serde_json::json;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;

use super::{flatten_leaf_names, plan_save, CycleGuard, PermissionError, PermissionGraph, PermissionStore};
use crate::models::{AuditEvent, AuditEventType, PermissionNode, UserPermissions};
use crate::services::metrics::record_permission_rejection;
use crate::services::AuditSink;

#[derive(Clone)]
pub struct PermissionService {
    store: Arc<dyn PermissionStore>,
    audit: Arc<dyn AuditSink>,
    /// Held from validation through commit so two mutations never race past the cycle check.
    mutation_lock: Arc<Mutex<()>>,
}

impl PermissionService {
    pub fn new(store: Arc<dyn PermissionStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            store,
            audit,
            mutation_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn store(&self) -> &Arc<dyn PermissionStore> {
        &self.store
    }

    /// Create a new permission tree. Nested nodes with an id link to existing permissions.
    #[instrument(skip(self, node), fields(name = %node.name()))]
    pub async fn create(
        &self,
        node: PermissionNode,
        actor: &str,
    ) -> Result<PermissionNode, PermissionError> {
        if node.is_persisted() {
            return Err(rejected(PermissionError::Validation(format!(
                "new permission '{}' must not carry an id (got {})",
                node.name(),
                node.id()
            ))));
        }
        validate_tree(&node).map_err(rejected)?;

        self.persist(node, actor, AuditEventType::PermissionCreated)
            .await
    }

    /// Rename permission `id` and, for composites, replace its children.
    #[instrument(skip(self, node), fields(name = %node.name()))]
    pub async fn update(
        &self,
        id: i64,
        node: PermissionNode,
        actor: &str,
    ) -> Result<PermissionNode, PermissionError> {
        if id <= 0 {
            return Err(rejected(PermissionError::Validation(format!(
                "permission id must be positive (got {})",
                id
            ))));
        }
        if node.id() != 0 && node.id() != id {
            return Err(rejected(PermissionError::Validation(format!(
                "document id {} does not match permission {}",
                node.id(),
                id
            ))));
        }
        let node = node.with_id(id);
        validate_tree(&node).map_err(rejected)?;

        self.persist(node, actor, AuditEventType::PermissionUpdated)
            .await
    }

    async fn persist(
        &self,
        node: PermissionNode,
        actor: &str,
        event_type: AuditEventType,
    ) -> Result<PermissionNode, PermissionError> {
        let _serialized = self.mutation_lock.lock().await;

        let graph = self.load_graph().await?;
        if node.is_persisted() && !graph.contains(node.id()) {
            return Err(rejected(PermissionError::NotFound(node.id())));
        }
        check_references(&graph, &node).map_err(rejected)?;
        CycleGuard::new(self.store.as_ref())
            .check(&node)
            .await
            .map_err(rejected)?;

        let id = self
            .store
            .save_tree(&plan_save(&node))
            .await
            .map_err(PermissionError::Persistence)?;
        let saved = self.load_graph().await?.materialize(id)?;

        tracing::info!(
            permission_id = id,
            name = %saved.name(),
            is_composite = saved.is_composite(),
            "Permission saved"
        );
        self.audit_quietly(AuditEvent::user_action(
            actor,
            event_type,
            Some("permission"),
            Some(id.to_string()),
            Some(json!({
                "name": saved.name(),
                "is_composite": saved.is_composite(),
                "children": saved.children().len(),
            })),
        ))
        .await;

        Ok(saved)
    }

    /// Delete one permission. Its children stay in place; only its edges and grants go.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64, actor: &str) -> Result<(), PermissionError> {
        if id <= 0 {
            return Err(PermissionError::Validation(format!(
                "permission id must be positive (got {})",
                id
            )));
        }

        let _serialized = self.mutation_lock.lock().await;
        let removed = self
            .store
            .delete_node(id)
            .await
            .map_err(PermissionError::Persistence)?;
        if !removed {
            return Err(PermissionError::NotFound(id));
        }

        tracing::info!(permission_id = id, "Permission deleted");
        self.audit_quietly(AuditEvent::user_action(
            actor,
            AuditEventType::PermissionDeleted,
            Some("permission"),
            Some(id.to_string()),
            None,
        ))
        .await;
        Ok(())
    }

    pub async fn get(&self, id: i64) -> Result<PermissionNode, PermissionError> {
        self.load_graph().await?.materialize(id)
    }

    /// Every permission as a full tree, by ascending id.
    pub async fn list(&self) -> Result<Vec<PermissionNode>, PermissionError> {
        let graph = self.load_graph().await?;
        graph.ids().map(|id| graph.materialize(id)).collect()
    }

    /// Union the referenced permissions into the user's held roots.
    #[instrument(skip(self, roots), fields(count = roots.len()))]
    pub async fn assign_to_user(
        &self,
        user_id: i64,
        roots: Vec<PermissionNode>,
        actor: &str,
    ) -> Result<UserPermissions, PermissionError> {
        if user_id <= 0 {
            return Err(PermissionError::Validation(format!(
                "user id must be positive (got {})",
                user_id
            )));
        }

        {
            let _serialized = self.mutation_lock.lock().await;
            let graph = self.load_graph().await?;

            let mut root_ids = BTreeSet::new();
            for (i, root) in roots.iter().enumerate() {
                if !root.is_persisted() {
                    return Err(PermissionError::Validation(format!(
                        "$[{}]: assigned permission '{}' must reference an existing id",
                        i,
                        root.name()
                    )));
                }
                let record = graph
                    .node(root.id())
                    .ok_or(PermissionError::NotFound(root.id()))?;
                if record.is_composite != root.is_composite() {
                    return Err(kind_mismatch(root.id(), record.is_composite));
                }
                root_ids.insert(root.id());
            }

            let root_ids: Vec<i64> = root_ids.into_iter().collect();
            self.store
                .grant_roots(user_id, &root_ids)
                .await
                .map_err(PermissionError::Persistence)?;

            tracing::info!(user_id, roots = ?root_ids, "Permissions assigned to user");
            self.audit_quietly(AuditEvent::user_action(
                actor,
                AuditEventType::UserPermissionsAssigned,
                Some("user"),
                Some(user_id.to_string()),
                Some(json!({ "permission_ids": root_ids })),
            ))
            .await;
        }

        self.user_permissions(user_id).await
    }

    /// The user's held roots as trees plus the leaf names they resolve to.
    pub async fn user_permissions(&self, user_id: i64) -> Result<UserPermissions, PermissionError> {
        let held = self
            .store
            .held_roots(user_id)
            .await
            .map_err(PermissionError::Persistence)?;
        let graph = self.load_graph().await?;

        let roots = held
            .iter()
            .filter(|id| graph.contains(**id))
            .map(|id| graph.materialize(*id))
            .collect::<Result<Vec<_>, _>>()?;
        let effective = flatten_leaf_names(&roots).into_iter().collect();

        Ok(UserPermissions {
            user_id,
            roots,
            effective,
            resolved_utc: Utc::now(),
        })
    }

    /// Leaf names the user is authorized for; embedded in session tokens at login.
    pub async fn effective_leaf_names(
        &self,
        user_id: i64,
    ) -> Result<BTreeSet<String>, PermissionError> {
        let held = self
            .store
            .held_roots(user_id)
            .await
            .map_err(PermissionError::Persistence)?;
        Ok(self.load_graph().await?.flatten_leaf_names(&held))
    }

    async fn load_graph(&self) -> Result<PermissionGraph, PermissionError> {
        self.store
            .load_graph()
            .await
            .map_err(PermissionError::Persistence)
    }

    async fn audit_quietly(&self, event: AuditEvent) {
        if let Err(e) = self.audit.record(event).await {
            tracing::error!(error = %e, "Failed to write permission audit event");
        }
    }
}

/// Count a mutation rejected before persistence.
fn rejected(err: PermissionError) -> PermissionError {
    let reason = match &err {
        PermissionError::Cycle(cycle) => cycle.reason(),
        PermissionError::Validation(_) => "validation",
        PermissionError::Codec(_) => "codec",
        PermissionError::NotFound(_) => "not_found",
        _ => return err,
    };
    tracing::warn!(reason, error = %err, "Permission mutation rejected");
    record_permission_rejection(reason);
    err
}

fn kind_mismatch(id: i64, stored_composite: bool) -> PermissionError {
    PermissionError::Validation(format!(
        "permission {} is stored as a {} and cannot change kind",
        id,
        if stored_composite { "composite" } else { "leaf" }
    ))
}

/// Structural checks that need no storage: names, ids and duplicate children.
fn validate_tree(root: &PermissionNode) -> Result<(), PermissionError> {
    let mut stack = vec![(root, "$".to_string())];

    while let Some((node, path)) = stack.pop() {
        if node.name().trim().is_empty() {
            return Err(PermissionError::Validation(format!(
                "{}: name must not be blank",
                path
            )));
        }
        if node.id() < 0 {
            return Err(PermissionError::Validation(format!(
                "{}: id must not be negative (got {})",
                path,
                node.id()
            )));
        }

        let mut seen = HashSet::new();
        for (i, child) in node.children().iter().enumerate() {
            let child_path = format!("{}.children[{}]", path, i);
            if child.is_persisted() && !seen.insert(child.id()) {
                return Err(PermissionError::Validation(format!(
                    "{}: permission {} is listed twice under '{}'",
                    child_path,
                    child.id(),
                    node.name()
                )));
            }
            stack.push((child, child_path));
        }
    }

    Ok(())
}

/// Every referenced id must exist with the kind the document claims.
fn check_references(graph: &PermissionGraph, root: &PermissionNode) -> Result<(), PermissionError> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_persisted() {
            let record = graph
                .node(node.id())
                .ok_or(PermissionError::NotFound(node.id()))?;
            if record.is_composite != node.is_composite() {
                return Err(kind_mismatch(node.id(), record.is_composite));
            }
        }
        stack.extend(node.children());
    }
    Ok(())
}
