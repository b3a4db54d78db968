//! # Node Capabilities
//!
//! Node types are plugins. Each registers a [`NodeBehavior`] that declares a
//! [`Capabilities`] set; the editing core dispatches on those capabilities and
//! never on the concrete type tag.

use crate::error::{StoreError, StoreResult};
use crate::node::{NodeContent, NodeType};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Which kind of children a container takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accepts {
    Blocks,
    Inlines,
}

/// What the cleanup pass does with a node that ended up empty
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmptyPolicy {
    /// Leave it alone
    Keep,
    /// Remove it, cascading to the parent
    Remove,
    /// Insert a fresh child of the given type
    Backfill(NodeType),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    /// `None` for leaves
    pub children: Option<Accepts>,
    pub inline: bool,
    /// Selection points may not land strictly inside an atomic node
    pub atomic: bool,
    pub when_empty: EmptyPolicy,
}

impl Capabilities {
    pub fn block(accepts: Accepts, when_empty: EmptyPolicy) -> Self {
        Self {
            children: Some(accepts),
            inline: false,
            atomic: false,
            when_empty,
        }
    }

    pub fn inline_container(when_empty: EmptyPolicy) -> Self {
        Self {
            children: Some(Accepts::Inlines),
            inline: true,
            atomic: false,
            when_empty,
        }
    }

    pub fn leaf(inline: bool, atomic: bool, when_empty: EmptyPolicy) -> Self {
        Self {
            children: None,
            inline,
            atomic,
            when_empty,
        }
    }

    pub fn is_container(&self) -> bool {
        self.children.is_some()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// Whether a node with `child` capabilities may be placed under this one
    pub fn accepts(&self, child: &Capabilities) -> bool {
        match self.children {
            None => false,
            Some(Accepts::Inlines) => child.inline,
            Some(Accepts::Blocks) => !child.inline,
        }
    }
}

/// Per-type contract registered by node plugins
pub trait NodeBehavior: fmt::Debug + Send + Sync {
    fn node_type(&self) -> NodeType;

    fn capabilities(&self) -> Capabilities;

    /// Equality used by the reconciler to detect content updates
    fn content_eq(&self, a: &NodeContent, b: &NodeContent) -> bool {
        a == b
    }

    /// Selection length of a payload; chars for text-bearing nodes
    fn content_len(&self, content: &NodeContent) -> usize {
        content.text_len()
    }

    /// Content given to freshly created nodes of this type
    fn default_content(&self) -> NodeContent {
        NodeContent::Empty
    }
}

/// Built-in behavior described entirely by data
#[derive(Debug, Clone)]
pub struct BuiltinNode {
    node_type: NodeType,
    capabilities: Capabilities,
    text: bool,
}

impl BuiltinNode {
    pub fn new(node_type: NodeType, capabilities: Capabilities) -> Self {
        Self {
            node_type,
            capabilities,
            text: false,
        }
    }

    /// Nodes of this type start out with empty text content
    pub fn text_bearing(mut self) -> Self {
        self.text = true;
        self
    }
}

impl NodeBehavior for BuiltinNode {
    fn node_type(&self) -> NodeType {
        self.node_type.clone()
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    fn default_content(&self) -> NodeContent {
        if self.text {
            NodeContent::text("")
        } else {
            NodeContent::Empty
        }
    }
}

/// Decorators own an opaque payload; only its `id` field identifies a change
#[derive(Debug, Clone, Default)]
pub struct DecoratorNode;

impl NodeBehavior for DecoratorNode {
    fn node_type(&self) -> NodeType {
        NodeType::DECORATOR
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::leaf(false, true, EmptyPolicy::Keep)
    }

    fn content_eq(&self, a: &NodeContent, b: &NodeContent) -> bool {
        match (a, b) {
            (NodeContent::Data { value: a }, NodeContent::Data { value: b }) => {
                match (a.get("id"), b.get("id")) {
                    (Some(a_id), Some(b_id)) => a_id == b_id,
                    _ => a == b,
                }
            }
            _ => a == b,
        }
    }
}

/// Lookup table from type tag to behavior
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    behaviors: HashMap<NodeType, Arc<dyn NodeBehavior>>,
}

impl NodeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in rich-text node types
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let text_placeholder = EmptyPolicy::Backfill(NodeType::TEXT);

        registry
            .register(BuiltinNode::new(
                NodeType::ROOT,
                Capabilities::block(Accepts::Blocks, EmptyPolicy::Backfill(NodeType::PARAGRAPH)),
            ))
            .register(BuiltinNode::new(
                NodeType::PARAGRAPH,
                Capabilities::block(Accepts::Inlines, text_placeholder.clone()),
            ))
            .register(BuiltinNode::new(
                NodeType::HEADING,
                Capabilities::block(Accepts::Inlines, text_placeholder.clone()),
            ))
            .register(BuiltinNode::new(
                NodeType::QUOTE,
                Capabilities::block(Accepts::Inlines, text_placeholder),
            ))
            .register(BuiltinNode::new(
                NodeType::LINK,
                Capabilities::inline_container(EmptyPolicy::Remove),
            ))
            .register(
                BuiltinNode::new(
                    NodeType::TEXT,
                    Capabilities::leaf(true, false, EmptyPolicy::Remove),
                )
                .text_bearing(),
            )
            .register(
                BuiltinNode::new(
                    NodeType::MENTION,
                    Capabilities::leaf(true, true, EmptyPolicy::Keep),
                )
                .text_bearing(),
            )
            .register(BuiltinNode::new(
                NodeType::LINE_BREAK,
                Capabilities::leaf(true, true, EmptyPolicy::Keep),
            ))
            .register(DecoratorNode);

        registry
    }

    /// Register (or replace) the behavior for its type tag
    pub fn register(&mut self, behavior: impl NodeBehavior + 'static) -> &mut Self {
        self.behaviors.insert(behavior.node_type(), Arc::new(behavior));
        self
    }

    pub fn contains(&self, node_type: &NodeType) -> bool {
        self.behaviors.contains_key(node_type)
    }

    pub fn behavior(&self, node_type: &NodeType) -> StoreResult<&Arc<dyn NodeBehavior>> {
        self.behaviors
            .get(node_type)
            .ok_or_else(|| StoreError::unknown_type(node_type.as_str()))
    }

    pub fn capabilities(&self, node_type: &NodeType) -> StoreResult<Capabilities> {
        Ok(self.behavior(node_type)?.capabilities())
    }

    pub fn content_len(&self, node_type: &NodeType, content: &NodeContent) -> usize {
        match self.behaviors.get(node_type) {
            Some(behavior) => behavior.content_len(content),
            None => content.text_len(),
        }
    }

    /// Content equality for `node_type`, falling back to value equality
    pub fn content_eq(&self, node_type: &NodeType, a: &NodeContent, b: &NodeContent) -> bool {
        match self.behaviors.get(node_type) {
            Some(behavior) => behavior.content_eq(a, b),
            None => a == b,
        }
    }
}
