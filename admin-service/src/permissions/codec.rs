//! JSON tree codec for permission nodes.
//!
//! ```json
//! { "id": 4, "name": "Admin", "isComposite": true,
//!   "children": [ { "id": 0, "name": "DeleteUser", "isComposite": false } ] }
//! ```
//!
//! `isComposite` is mandatory on every node. Composites must carry an explicit
//! `children` array, even when empty. `id` may be omitted for nodes that do not exist
//! yet and defaults to 0.

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::models::PermissionNode;

pub const DISCRIMINATOR: &str = "isComposite";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("{path}: expected a JSON object")]
    NotAnObject { path: String },

    #[error("{path}: expected a JSON array of permission documents")]
    NotAnArray { path: String },

    #[error("{path}: missing boolean discriminator 'isComposite'")]
    MissingDiscriminator { path: String },

    #[error("{path}: missing required field '{field}'")]
    MissingField { path: String, field: &'static str },

    #[error("{path}: field '{field}' has the wrong type")]
    InvalidField { path: String, field: &'static str },

    #[error("{path}: composite permission requires an explicit 'children' array")]
    MissingChildren { path: String },

    #[error("{path}: leaf permission cannot have children")]
    LeafWithChildren { path: String },
}

/// Parse one tree document.
pub fn parse(doc: &Value) -> Result<PermissionNode, CodecError> {
    parse_at(doc, "$")
}

/// Parse a flat list of tree documents, as accepted by user assignment.
pub fn parse_list(doc: &Value) -> Result<Vec<PermissionNode>, CodecError> {
    let items = doc.as_array().ok_or_else(|| CodecError::NotAnArray {
        path: "$".to_string(),
    })?;
    items
        .iter()
        .enumerate()
        .map(|(i, item)| parse_at(item, &format!("$[{}]", i)))
        .collect()
}

fn parse_at(doc: &Value, path: &str) -> Result<PermissionNode, CodecError> {
    let obj = doc.as_object().ok_or_else(|| CodecError::NotAnObject {
        path: path.to_string(),
    })?;

    let is_composite = match obj.get(DISCRIMINATOR) {
        None | Some(Value::Null) => {
            return Err(CodecError::MissingDiscriminator {
                path: path.to_string(),
            })
        }
        Some(Value::Bool(b)) => *b,
        Some(_) => {
            return Err(CodecError::InvalidField {
                path: path.to_string(),
                field: DISCRIMINATOR,
            })
        }
    };

    let id = read_id(obj, path)?;
    let name = match obj.get("name") {
        None | Some(Value::Null) => {
            return Err(CodecError::MissingField {
                path: path.to_string(),
                field: "name",
            })
        }
        Some(Value::String(s)) => s.clone(),
        Some(_) => {
            return Err(CodecError::InvalidField {
                path: path.to_string(),
                field: "name",
            })
        }
    };

    let children = match obj.get("children") {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => Some(items),
        Some(_) => {
            return Err(CodecError::InvalidField {
                path: path.to_string(),
                field: "children",
            })
        }
    };

    if !is_composite {
        if children.is_some_and(|c| !c.is_empty()) {
            return Err(CodecError::LeafWithChildren {
                path: path.to_string(),
            });
        }
        return Ok(PermissionNode::Leaf { id, name });
    }

    let items = children.ok_or_else(|| CodecError::MissingChildren {
        path: path.to_string(),
    })?;
    let children = items
        .iter()
        .enumerate()
        .map(|(i, child)| parse_at(child, &format!("{}.children[{}]", path, i)))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PermissionNode::Composite { id, name, children })
}

fn read_id(obj: &Map<String, Value>, path: &str) -> Result<i64, CodecError> {
    match obj.get("id") {
        None | Some(Value::Null) => Ok(0),
        Some(v) => v.as_i64().ok_or_else(|| CodecError::InvalidField {
            path: path.to_string(),
            field: "id",
        }),
    }
}

/// Serialize a tree back into its document form.
pub fn to_document(node: &PermissionNode) -> Value {
    match node {
        PermissionNode::Leaf { id, name } => json!({
            "id": id,
            "name": name,
            DISCRIMINATOR: false,
        }),
        PermissionNode::Composite { id, name, children } => json!({
            "id": id,
            "name": name,
            DISCRIMINATOR: true,
            "children": children.iter().map(to_document).collect::<Vec<_>>(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_tree() {
        let doc = json!({
            "id": 3,
            "name": "Admin",
            "isComposite": true,
            "children": [
                { "id": 1, "name": "DeleteUser", "isComposite": false },
                { "name": "Reports", "isComposite": true, "children": [] }
            ]
        });

        let node = parse(&doc).unwrap();
        assert_eq!(
            node,
            PermissionNode::composite(
                3,
                "Admin",
                vec![
                    PermissionNode::leaf(1, "DeleteUser"),
                    PermissionNode::composite(0, "Reports", vec![]),
                ]
            )
        );
    }

    #[test]
    fn composite_without_children_is_rejected() {
        let doc = json!({ "name": "Admin", "isComposite": true });
        assert_eq!(
            parse(&doc),
            Err(CodecError::MissingChildren {
                path: "$".to_string()
            })
        );
    }

    #[test]
    fn missing_discriminator_names_the_offending_node() {
        let doc = json!({
            "name": "Admin",
            "isComposite": true,
            "children": [ { "name": "Orphan" } ]
        });
        assert_eq!(
            parse(&doc),
            Err(CodecError::MissingDiscriminator {
                path: "$.children[0]".to_string()
            })
        );
    }

    #[test]
    fn leaf_may_carry_an_empty_children_array_only() {
        let empty = json!({ "name": "CreateUser", "isComposite": false, "children": [] });
        assert_eq!(parse(&empty).unwrap(), PermissionNode::leaf(0, "CreateUser"));

        let nested = json!({
            "name": "CreateUser",
            "isComposite": false,
            "children": [ { "name": "x", "isComposite": false } ]
        });
        assert!(matches!(
            parse(&nested),
            Err(CodecError::LeafWithChildren { .. })
        ));
    }

    #[test]
    fn rejects_wrongly_typed_fields() {
        assert!(matches!(
            parse(&json!({ "name": "A", "isComposite": "yes" })),
            Err(CodecError::InvalidField { field: "isComposite", .. })
        ));
        assert!(matches!(
            parse(&json!({ "id": "7", "name": "A", "isComposite": false })),
            Err(CodecError::InvalidField { field: "id", .. })
        ));
        assert!(matches!(
            parse(&json!({ "isComposite": false })),
            Err(CodecError::MissingField { field: "name", .. })
        ));
        assert!(matches!(
            parse(&json!(["not", "an", "object"])),
            Err(CodecError::NotAnObject { .. })
        ));
    }

    #[test]
    fn list_paths_carry_the_index() {
        let docs = json!([
            { "id": 1, "name": "Read", "isComposite": false },
            { "id": 2, "name": "Admin" }
        ]);
        assert_eq!(
            parse_list(&docs),
            Err(CodecError::MissingDiscriminator {
                path: "$[1]".to_string()
            })
        );
        assert!(matches!(
            parse_list(&json!({ "id": 1 })),
            Err(CodecError::NotAnArray { .. })
        ));
        assert!(parse_list(&json!([])).unwrap().is_empty());
    }

    #[test]
    fn document_form_uses_the_discriminator() {
        let node = PermissionNode::composite(2, "Admin", vec![PermissionNode::leaf(1, "CreateUser")]);
        let doc = to_document(&node);
        assert_eq!(doc["isComposite"], true);
        assert_eq!(doc["children"][0]["isComposite"], false);
        assert!(doc["children"][0].get("children").is_none());
        assert_eq!(parse(&doc).unwrap(), node);
    }

    #[test]
    fn serde_goes_through_the_codec() {
        let node: PermissionNode = serde_json::from_value(json!({
            "id": 9, "name": "Audit", "isComposite": false
        }))
        .unwrap();
        assert_eq!(node, PermissionNode::leaf(9, "Audit"));

        let err = serde_json::from_value::<PermissionNode>(json!({
            "name": "Audit", "isComposite": true
        }))
        .unwrap_err();
        assert!(err.to_string().contains("children"));
    }
}
