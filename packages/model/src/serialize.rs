//! # Interchange Form
//!
//! A snapshot exports as a plain ordered tree of `{key, type, content, children}`
//! records. Importing rebuilds an equivalent [`NodeStore`] and re-validates
//! every tree invariant, so a hand-edited or corrupted file is rejected
//! instead of producing a broken document.

use crate::capability::NodeRegistry;
use crate::error::{StoreError, StoreResult};
use crate::key::NodeKey;
use crate::node::{Node, NodeContent, NodeType};
use crate::store::NodeStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// One node of an exported tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedNode {
    pub key: NodeKey,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub content: NodeContent,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SerializedNode>,
}

/// Blueprint for a fresh subtree; keys are allocated on build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<NodeContent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSpec>,
}

impl NodeSpec {
    pub fn new(node_type: NodeType) -> Self {
        Self {
            node_type,
            content: None,
            children: Vec::new(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(NodeType::TEXT).with_content(NodeContent::text(text))
    }

    pub fn paragraph(children: Vec<NodeSpec>) -> Self {
        Self::new(NodeType::PARAGRAPH).with_children(children)
    }

    pub fn with_content(mut self, content: NodeContent) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_children(mut self, children: Vec<NodeSpec>) -> Self {
        self.children = children;
        self
    }
}

impl NodeStore {
    /// Export the whole document
    pub fn to_serialized(&self) -> StoreResult<SerializedNode> {
        self.serialize_subtree(self.root())
    }

    /// Export the subtree rooted at `key`
    pub fn serialize_subtree(&self, key: NodeKey) -> StoreResult<SerializedNode> {
        let node = self.get(key)?;
        let children = node
            .children()
            .iter()
            .map(|child| self.serialize_subtree(*child))
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(SerializedNode {
            key,
            node_type: node.node_type().clone(),
            content: node.content().clone(),
            children,
        })
    }

    /// Rebuild a store from an exported tree, keeping its keys
    pub fn from_serialized(registry: Arc<NodeRegistry>, tree: &SerializedNode) -> StoreResult<Self> {
        let mut nodes = HashMap::new();
        collect(&registry, tree, None, &mut nodes)?;

        let store = NodeStore::from_parts(nodes, tree.key, registry);
        store.validate()?;

        if let Some(max) = store.keys_in_order().into_iter().max() {
            NodeKey::reserve(max);
        }
        Ok(store)
    }

    /// Build a detached subtree from `spec`; returns its root key
    pub fn build(&mut self, spec: &NodeSpec) -> StoreResult<NodeKey> {
        let key = match &spec.content {
            Some(content) => self.create_node(spec.node_type.clone(), content.clone())?,
            None => self.create_default(spec.node_type.clone())?,
        };
        for (index, child) in spec.children.iter().enumerate() {
            let child_key = self.build(child)?;
            self.insert_child(key, index, child_key)?;
        }
        Ok(key)
    }
}

fn collect(
    registry: &NodeRegistry,
    tree: &SerializedNode,
    parent: Option<NodeKey>,
    nodes: &mut HashMap<NodeKey, Arc<Node>>,
) -> StoreResult<()> {
    registry.behavior(&tree.node_type)?;

    let mut node = Node::new(tree.key, tree.node_type.clone(), tree.content.clone());
    node.parent = parent;
    node.children = tree.children.iter().map(|c| c.key).collect();

    if nodes.insert(tree.key, Arc::new(node)).is_some() {
        return Err(StoreError::DuplicateKey(tree.key));
    }
    for child in &tree.children {
        collect(registry, child, Some(tree.key), nodes)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Arc<NodeRegistry> {
        Arc::new(NodeRegistry::with_defaults())
    }

    fn sample() -> NodeStore {
        let mut store = NodeStore::new(registry()).unwrap();
        let root = store.root();
        let paragraph = store
            .build(&NodeSpec::paragraph(vec![
                NodeSpec::text("Hello "),
                NodeSpec::new(NodeType::LINK).with_children(vec![NodeSpec::text("world")]),
            ]))
            .unwrap();
        store.insert_child(root, 0, paragraph).unwrap();
        store
    }

    #[test]
    fn test_round_trip_preserves_keys_and_order() {
        let store = sample();
        let tree = store.to_serialized().unwrap();

        let rebuilt = NodeStore::from_serialized(registry(), &tree).unwrap();

        assert_eq!(rebuilt.root(), store.root());
        assert_eq!(rebuilt.keys_in_order(), store.keys_in_order());
        assert_eq!(rebuilt.to_serialized().unwrap(), tree);
        assert_eq!(rebuilt.text_content(), "Hello world");
    }

    #[test]
    fn test_json_shape() {
        let store = NodeStore::empty_document(registry()).unwrap();
        let json = serde_json::to_value(store.to_serialized().unwrap()).unwrap();

        assert_eq!(json["type"], "root");
        assert_eq!(json["children"][0]["type"], "paragraph");
        assert_eq!(json["children"][0]["children"][0]["content"]["kind"], "text");
    }

    #[test]
    fn test_import_rejects_duplicate_keys() {
        let mut tree = sample().to_serialized().unwrap();
        let dup = tree.children[0].children[0].clone();
        tree.children[0].children.push(dup);

        let err = NodeStore::from_serialized(registry(), &tree).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(_)));
    }

    #[test]
    fn test_import_rejects_wrong_capabilities() {
        let mut tree = sample().to_serialized().unwrap();
        // text directly under the root
        let text = tree.children[0].children.remove(0);
        tree.children.push(text);

        let err = NodeStore::from_serialized(registry(), &tree).unwrap_err();
        assert!(matches!(err, StoreError::InvalidStructure(_)));
    }

    #[test]
    fn test_import_rejects_unknown_types() {
        let mut tree = sample().to_serialized().unwrap();
        tree.children[0].node_type = NodeType::new("poll");

        let err = NodeStore::from_serialized(registry(), &tree).unwrap_err();
        assert_eq!(err, StoreError::UnknownType("poll".to_string()));
    }

    #[test]
    fn test_imported_keys_are_never_reissued() {
        let tree = sample().to_serialized().unwrap();
        let mut rebuilt = NodeStore::from_serialized(registry(), &tree).unwrap();
        let max = rebuilt.keys_in_order().into_iter().max().unwrap();

        let fresh = rebuilt.create_default(NodeType::PARAGRAPH).unwrap();
        assert!(fresh > max);
    }
}
