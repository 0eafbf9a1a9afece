use super::{AncestorOracle, CycleError, PermissionError};
use crate::models::PermissionNode;

/// Identity of a composite on the containment path. Nodes that are not persisted yet
/// have no id and are identified by name.
#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeKey<'a> {
    Persisted(i64),
    Transient(&'a str),
}

impl<'a> NodeKey<'a> {
    fn of(node: &'a PermissionNode) -> Self {
        if node.is_persisted() {
            NodeKey::Persisted(node.id())
        } else {
            NodeKey::Transient(node.name())
        }
    }
}

enum Step<'a> {
    Enter(&'a PermissionNode),
    Exit,
}

/// Rejects submitted trees that would make the containment relation cyclic.
///
/// Cycles entirely inside the submission are caught by tracking the current path.
/// Cycles that only close once the submission is linked to committed edges are caught
/// by asking the [`AncestorOracle`] about every persisted composite child.
pub struct CycleGuard<'a, O: AncestorOracle + ?Sized> {
    oracle: &'a O,
}

impl<'a, O: AncestorOracle + ?Sized> CycleGuard<'a, O> {
    pub fn new(oracle: &'a O) -> Self {
        Self { oracle }
    }

    pub async fn check(&self, root: &PermissionNode) -> Result<(), PermissionError> {
        let mut path: Vec<NodeKey<'_>> = Vec::new();
        let mut stack = vec![Step::Enter(root)];

        while let Some(step) = stack.pop() {
            let node = match step {
                Step::Exit => {
                    path.pop();
                    continue;
                }
                Step::Enter(node) => node,
            };
            let PermissionNode::Composite { children, .. } = node else {
                continue;
            };

            let key = NodeKey::of(node);
            if path.contains(&key) {
                return Err(CycleError::SelfContainmentCycle {
                    id: node.id(),
                    name: node.name().to_string(),
                }
                .into());
            }
            path.push(key);
            stack.push(Step::Exit);

            for child in children {
                self.check_child(node, child, &path).await?;
            }
            stack.extend(children.iter().rev().map(Step::Enter));
        }

        Ok(())
    }

    async fn check_child(
        &self,
        parent: &PermissionNode,
        child: &PermissionNode,
        path: &[NodeKey<'_>],
    ) -> Result<(), PermissionError> {
        let self_reference = if parent.is_persisted() {
            child.id() == parent.id()
        } else {
            child.is_composite() && !child.is_persisted() && child.name() == parent.name()
        };
        if self_reference {
            return Err(CycleError::DirectSelfReference {
                id: parent.id(),
                name: parent.name().to_string(),
            }
            .into());
        }

        if !(child.is_composite() && child.is_persisted()) {
            return Ok(());
        }

        for key in path {
            let NodeKey::Persisted(ancestor) = key else {
                continue;
            };
            let closes_cycle = self
                .oracle
                .is_ancestor(child.id(), *ancestor)
                .await
                .map_err(PermissionError::Persistence)?;
            if closes_cycle {
                return Err(CycleError::WouldCreateCycleViaExistingHierarchy {
                    parent_id: parent.id(),
                    child_id: child.id(),
                    child_name: child.name().to_string(),
                }
                .into());
            }
        }

        Ok(())
    }
}
