use std::collections::{BTreeSet, HashSet};

use crate::models::PermissionNode;

/// Union of the leaf names reachable from `roots`.
///
/// A persisted composite reached twice is only walked once.
pub fn flatten_leaf_names(roots: &[PermissionNode]) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let mut visited = HashSet::new();
    let mut stack: Vec<&PermissionNode> = roots.iter().rev().collect();

    while let Some(node) = stack.pop() {
        match node {
            PermissionNode::Leaf { name, .. } => {
                names.insert(name.clone());
            }
            PermissionNode::Composite { id, children, .. } => {
                if *id > 0 && !visited.insert(*id) {
                    continue;
                }
                stack.extend(children.iter().rev());
            }
        }
    }

    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_reached_through_two_paths_appears_once() {
        let delete = PermissionNode::leaf(3, "DeleteUser");
        let admin = PermissionNode::composite(
            2,
            "Admin",
            vec![delete.clone(), PermissionNode::leaf(4, "CreateUser")],
        );
        let audit = PermissionNode::composite(5, "Audit", vec![delete]);

        let names = flatten_leaf_names(&[admin, audit]);
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["CreateUser".to_string(), "DeleteUser".to_string()]
        );
    }

    #[test]
    fn bare_leaf_roots_count() {
        let names = flatten_leaf_names(&[PermissionNode::leaf(1, "Export")]);
        assert!(names.contains("Export"));
    }

    #[test]
    fn empty_composites_contribute_nothing() {
        let names = flatten_leaf_names(&[PermissionNode::composite(0, "Empty", vec![])]);
        assert!(names.is_empty());
    }
}
