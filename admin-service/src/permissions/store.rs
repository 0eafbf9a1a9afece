//! Storage seam for the permission hierarchy.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use super::PermissionGraph;
use crate::models::{PermissionEdge, PermissionNode, PermissionRecord};

/// Answers containment questions over committed edges only.
#[async_trait]
pub trait AncestorOracle: Send + Sync {
    /// Whether `candidate_ancestor_id` transitively contains `node_id`.
    async fn is_ancestor(
        &self,
        candidate_ancestor_id: i64,
        node_id: i64,
    ) -> Result<bool, anyhow::Error>;
}

#[async_trait]
pub trait PermissionStore: AncestorOracle {
    /// Every node and edge in one consistent read.
    async fn load_graph(&self) -> Result<PermissionGraph, anyhow::Error>;

    /// Apply a plan from [`plan_save`] atomically. Returns the root's id.
    async fn save_tree(&self, plan: &[PlannedNode]) -> Result<i64, anyhow::Error>;

    /// Remove a node with its edges and user grants. `false` if it did not exist.
    async fn delete_node(&self, id: i64) -> Result<bool, anyhow::Error>;

    async fn held_roots(&self, user_id: i64) -> Result<Vec<i64>, anyhow::Error>;

    /// Union `root_ids` into the user's held roots.
    async fn grant_roots(&self, user_id: i64, root_ids: &[i64]) -> Result<(), anyhow::Error>;
}

/// One row of a save plan.
///
/// Plans are in post-order: children come before their parent, the submitted root is
/// last, and `key` equals the row's index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedNode {
    pub key: usize,
    /// 0 for a node that must be inserted.
    pub id: i64,
    pub name: String,
    pub is_composite: bool,
    /// New nodes and the submitted root are written; other existing nodes are only linked.
    pub write: bool,
    /// Keys of the children whose edges replace the current ones. Empty unless written.
    pub children: Vec<usize>,
}

/// Flatten a validated tree into the writes needed to persist it.
pub fn plan_save(root: &PermissionNode) -> Vec<PlannedNode> {
    let mut plan = Vec::new();
    plan_node(root, true, &mut plan);
    plan
}

fn plan_node(node: &PermissionNode, is_root: bool, plan: &mut Vec<PlannedNode>) -> usize {
    let write = is_root || !node.is_persisted();
    let children = if write {
        node.children()
            .iter()
            .map(|child| plan_node(child, false, plan))
            .collect()
    } else {
        Vec::new()
    };

    let key = plan.len();
    plan.push(PlannedNode {
        key,
        id: node.id(),
        name: node.name().to_string(),
        is_composite: node.is_composite(),
        write,
        children,
    });
    key
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    nodes: BTreeMap<i64, PermissionRecord>,
    edges: Vec<PermissionEdge>,
    grants: HashMap<i64, BTreeSet<i64>>,
    next_id: i64,
}

impl MemoryState {
    fn graph(&self) -> PermissionGraph {
        PermissionGraph::new(self.nodes.values().cloned().collect(), self.edges.clone())
    }
}

/// Process-local store used by tests and local runs without Postgres.
#[derive(Default)]
pub struct InMemoryPermissionStore {
    state: Mutex<MemoryState>,
}

impl InMemoryPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, anyhow::Error> {
        self.state
            .lock()
            .map_err(|_| anyhow::anyhow!("permission store lock poisoned"))
    }

    pub fn node_count(&self) -> usize {
        self.lock().map(|s| s.nodes.len()).unwrap_or(0)
    }

    pub fn edge_count(&self) -> usize {
        self.lock().map(|s| s.edges.len()).unwrap_or(0)
    }

    /// Insert an edge without any checks, to simulate a hierarchy corrupted out of band.
    pub fn force_edge(&self, parent_id: i64, child_id: i64) {
        if let Ok(mut state) = self.lock() {
            let position = state.edges.iter().filter(|e| e.parent_id == parent_id).count() as i32;
            state.edges.push(PermissionEdge {
                parent_id,
                child_id,
                position,
            });
        }
    }
}

#[async_trait]
impl AncestorOracle for InMemoryPermissionStore {
    async fn is_ancestor(
        &self,
        candidate_ancestor_id: i64,
        node_id: i64,
    ) -> Result<bool, anyhow::Error> {
        Ok(self.lock()?.graph().is_ancestor(candidate_ancestor_id, node_id))
    }
}

#[async_trait]
impl PermissionStore for InMemoryPermissionStore {
    async fn load_graph(&self) -> Result<PermissionGraph, anyhow::Error> {
        Ok(self.lock()?.graph())
    }

    async fn save_tree(&self, plan: &[PlannedNode]) -> Result<i64, anyhow::Error> {
        let mut guard = self.lock()?;
        // Work on a copy so a failed plan leaves nothing behind.
        let mut state = guard.clone();
        let mut ids = vec![0_i64; plan.len()];

        for step in plan {
            let id = if step.id == 0 {
                state.next_id += 1;
                let id = state.next_id;
                state.nodes.insert(
                    id,
                    PermissionRecord {
                        id,
                        name: step.name.clone(),
                        is_composite: step.is_composite,
                    },
                );
                id
            } else {
                let record = state
                    .nodes
                    .get_mut(&step.id)
                    .ok_or_else(|| anyhow::anyhow!("permission {} does not exist", step.id))?;
                if step.write {
                    record.name = step.name.clone();
                }
                step.id
            };
            ids[step.key] = id;

            if step.write && step.is_composite {
                state.edges.retain(|e| e.parent_id != id);
                for (position, child_key) in step.children.iter().enumerate() {
                    state.edges.push(PermissionEdge {
                        parent_id: id,
                        child_id: ids[*child_key],
                        position: position as i32,
                    });
                }
            }
        }

        let root_id = ids
            .last()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("empty save plan"))?;
        *guard = state;
        Ok(root_id)
    }

    async fn delete_node(&self, id: i64) -> Result<bool, anyhow::Error> {
        let mut state = self.lock()?;
        if state.nodes.remove(&id).is_none() {
            return Ok(false);
        }
        state.edges.retain(|e| e.parent_id != id && e.child_id != id);
        for roots in state.grants.values_mut() {
            roots.remove(&id);
        }
        Ok(true)
    }

    async fn held_roots(&self, user_id: i64) -> Result<Vec<i64>, anyhow::Error> {
        Ok(self
            .lock()?
            .grants
            .get(&user_id)
            .map(|roots| roots.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn grant_roots(&self, user_id: i64, root_ids: &[i64]) -> Result<(), anyhow::Error> {
        self.lock()?
            .grants
            .entry(user_id)
            .or_default()
            .extend(root_ids.iter().copied());
        Ok(())
    }
}
