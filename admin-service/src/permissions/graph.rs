use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use super::PermissionError;
use crate::models::{PermissionEdge, PermissionNode, PermissionRecord};

/// Committed permission hierarchy held in memory: node rows plus ordered adjacency.
///
/// Every walk is guarded, so a cycle that reached storage out of band is reported
/// (or skipped) instead of looping.
#[derive(Debug, Clone, Default)]
pub struct PermissionGraph {
    nodes: BTreeMap<i64, PermissionRecord>,
    children: HashMap<i64, Vec<i64>>,
}

impl PermissionGraph {
    pub fn new(records: Vec<PermissionRecord>, mut edges: Vec<PermissionEdge>) -> Self {
        edges.sort_by_key(|e| (e.parent_id, e.position));

        let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
        for edge in edges {
            children.entry(edge.parent_id).or_default().push(edge.child_id);
        }

        Self {
            nodes: records.into_iter().map(|r| (r.id, r)).collect(),
            children,
        }
    }

    pub fn node(&self, id: i64) -> Option<&PermissionRecord> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Node ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.nodes.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn children_of(&self, id: i64) -> &[i64] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `ancestor` transitively contains `node`.
    pub fn is_ancestor(&self, ancestor: i64, node: i64) -> bool {
        let mut visited = HashSet::new();
        let mut stack = self.children_of(ancestor).to_vec();
        while let Some(id) = stack.pop() {
            if id == node {
                return true;
            }
            if visited.insert(id) {
                stack.extend_from_slice(self.children_of(id));
            }
        }
        false
    }

    /// Rebuild the full tree rooted at `id`.
    pub fn materialize(&self, id: i64) -> Result<PermissionNode, PermissionError> {
        if !self.contains(id) {
            return Err(PermissionError::NotFound(id));
        }
        self.materialize_on_path(id, &mut Vec::new())
    }

    fn materialize_on_path(
        &self,
        id: i64,
        path: &mut Vec<i64>,
    ) -> Result<PermissionNode, PermissionError> {
        let record = self.node(id).ok_or_else(|| {
            PermissionError::CorruptHierarchy(format!("edge points at missing permission {}", id))
        })?;

        if !record.is_composite {
            return Ok(PermissionNode::leaf(record.id, record.name.clone()));
        }
        if path.contains(&id) {
            return Err(PermissionError::CorruptHierarchy(format!(
                "permission '{}' (id {}) contains itself",
                record.name, id
            )));
        }

        path.push(id);
        let children = self
            .children_of(id)
            .iter()
            .map(|child| self.materialize_on_path(*child, path))
            .collect::<Result<Vec<_>, _>>()?;
        path.pop();

        Ok(PermissionNode::composite(record.id, record.name.clone(), children))
    }

    /// Leaf names reachable from `root_ids`. Missing ids are skipped.
    pub fn flatten_leaf_names(&self, root_ids: &[i64]) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        let mut visited = HashSet::new();
        let mut stack: Vec<i64> = root_ids.iter().rev().copied().collect();

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(record) = self.node(id) else {
                tracing::warn!(permission_id = id, "Skipping missing permission while flattening");
                continue;
            };
            if record.is_composite {
                stack.extend(self.children_of(id).iter().rev().copied());
            } else {
                names.insert(record.name.clone());
            }
        }

        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, name: &str, is_composite: bool) -> PermissionRecord {
        PermissionRecord {
            id,
            name: name.to_string(),
            is_composite,
        }
    }

    fn edge(parent_id: i64, child_id: i64, position: i32) -> PermissionEdge {
        PermissionEdge {
            parent_id,
            child_id,
            position,
        }
    }

    /// Super(1) -> [Admin(2), Audit(5)], Admin(2) -> [Delete(3), Create(4)], Audit(5) -> [Delete(3)]
    fn sample() -> PermissionGraph {
        PermissionGraph::new(
            vec![
                record(1, "Super", true),
                record(2, "Admin", true),
                record(3, "DeleteUser", false),
                record(4, "CreateUser", false),
                record(5, "Audit", true),
            ],
            vec![
                edge(2, 4, 1),
                edge(1, 2, 0),
                edge(2, 3, 0),
                edge(1, 5, 1),
                edge(5, 3, 0),
            ],
        )
    }

    #[test]
    fn materialize_follows_edge_positions() {
        let admin = sample().materialize(2).unwrap();
        let names: Vec<&str> = admin.children().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["DeleteUser", "CreateUser"]);
    }

    #[test]
    fn materialize_unknown_id_is_not_found() {
        assert!(matches!(
            sample().materialize(42),
            Err(PermissionError::NotFound(42))
        ));
    }

    #[test]
    fn ancestry_is_transitive_and_directed() {
        let graph = sample();
        assert!(graph.is_ancestor(1, 3));
        assert!(graph.is_ancestor(5, 3));
        assert!(!graph.is_ancestor(2, 1));
        assert!(!graph.is_ancestor(3, 3));
    }

    #[test]
    fn flatten_deduplicates_shared_leaves() {
        let names = sample().flatten_leaf_names(&[1]);
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["CreateUser".to_string(), "DeleteUser".to_string()]
        );
    }

    #[test]
    fn walks_terminate_on_corrupt_cycles() {
        let graph = PermissionGraph::new(
            vec![
                record(1, "A", true),
                record(2, "B", true),
                record(3, "Leaf", false),
            ],
            vec![edge(1, 2, 0), edge(2, 1, 0), edge(2, 3, 1)],
        );

        assert_eq!(graph.flatten_leaf_names(&[1]).len(), 1);
        assert!(graph.is_ancestor(1, 1));
        assert!(matches!(
            graph.materialize(1),
            Err(PermissionError::CorruptHierarchy(_))
        ));
    }
}
