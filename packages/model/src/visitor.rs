use crate::key::NodeKey;
use crate::node::{Node, NodeType};
use crate::store::NodeStore;

/// Visitor pattern for walking a store in document order
///
/// The default implementation walks the entire subtree.
/// Override `visit_node` to act on nodes, and call `walk_node` to keep descending.
pub trait Visitor: Sized {
    fn visit_node(&mut self, store: &NodeStore, node: &Node) {
        walk_node(self, store, node);
    }
}

/// Walk the whole document starting at the root
pub fn walk_document<V: Visitor>(visitor: &mut V, store: &NodeStore) {
    if let Ok(root) = store.get(store.root()) {
        visitor.visit_node(store, root);
    }
}

pub fn walk_node<V: Visitor>(visitor: &mut V, store: &NodeStore, node: &Node) {
    for child in node.children() {
        if let Ok(child) = store.get(*child) {
            visitor.visit_node(store, child);
        }
    }
}

/// Collects keys in document (pre-)order
#[derive(Debug, Default)]
pub struct KeyCollector {
    pub keys: Vec<NodeKey>,
}

impl Visitor for KeyCollector {
    fn visit_node(&mut self, store: &NodeStore, node: &Node) {
        self.keys.push(node.key());
        walk_node(self, store, node);
    }
}

/// Builds the plain-text rendition of a document
#[derive(Debug, Default)]
pub struct TextCollector {
    out: String,
    blocks: usize,
}

impl TextCollector {
    pub fn finish(self) -> String {
        self.out
    }
}

impl Visitor for TextCollector {
    fn visit_node(&mut self, store: &NodeStore, node: &Node) {
        if let Some(text) = node.text() {
            self.out.push_str(text);
            return;
        }
        if node.node_type() == &NodeType::LINE_BREAK {
            self.out.push('\n');
            return;
        }

        let is_block = node.key() != store.root()
            && store
                .capabilities(node.key())
                .map(|caps| caps.is_container() && !caps.inline)
                .unwrap_or(false);
        if is_block {
            if self.blocks > 0 {
                self.out.push_str("\n\n");
            }
            self.blocks += 1;
        }

        walk_node(self, store, node);
    }
}
