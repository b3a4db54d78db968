//! # Node Store
//!
//! Arena of document nodes keyed by [`NodeKey`].
//!
//! ## Copy-on-write
//!
//! ```text
//! base store ──Arc──▶ { k1: Arc<Node>, k2: Arc<Node>, k3: Arc<Node> }
//!                                 │          ▲          ▲
//! fork (clone) ──Arc──────────────┘          │ shared   │ shared
//!
//! after set_content(k3) on the fork:
//! fork ──▶ { k1': clone, k2: (shared), k3': clone }   k1 is k3's parent
//! ```
//!
//! - Cloning a store is a reference-count bump
//! - The first write clones the shard directory and the written key's
//!   shard (pointers only); the other shards stay shared
//! - Writing a node clones it and every ancestor up to the root, so any
//!   subtree whose root is still pointer-identical is known to be untouched

use crate::capability::{Capabilities, EmptyPolicy, NodeRegistry};
use crate::error::{StoreError, StoreResult};
use crate::key::NodeKey;
use crate::node::{Node, NodeContent, NodeType};
use crate::node_map::NodeMap;
use crate::visitor::{walk_document, KeyCollector, TextCollector};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct NodeStore {
    nodes: NodeMap,
    root: NodeKey,
    registry: Arc<NodeRegistry>,
}

impl NodeStore {
    /// Create a store holding only an empty root node
    pub fn new(registry: Arc<NodeRegistry>) -> StoreResult<Self> {
        let content = registry.behavior(&NodeType::ROOT)?.default_content();
        let root = Node::new(NodeKey::next(), NodeType::ROOT, content);
        let key = root.key;

        let mut nodes = NodeMap::new();
        nodes.insert(key, Arc::new(root));

        Ok(Self {
            nodes,
            root: key,
            registry,
        })
    }

    /// Create the canonical empty document: the root, backfilled per registry
    pub fn empty_document(registry: Arc<NodeRegistry>) -> StoreResult<Self> {
        let mut store = Self::new(registry)?;
        let root = store.root;
        store.backfill(root)?;
        Ok(store)
    }

    pub(crate) fn from_parts(
        nodes: HashMap<NodeKey, Arc<Node>>,
        root: NodeKey,
        registry: Arc<NodeRegistry>,
    ) -> Self {
        Self {
            nodes: nodes.into_iter().collect(),
            root,
            registry,
        }
    }

    pub fn root(&self) -> NodeKey {
        self.root
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(&key)
    }

    pub fn get(&self, key: NodeKey) -> StoreResult<&Node> {
        self.nodes
            .get(&key)
            .map(|node| node.as_ref())
            .ok_or(StoreError::NotFound(key))
    }

    /// Shared handle to a node, for identity comparison across snapshots
    pub fn get_shared(&self, key: NodeKey) -> Option<&Arc<Node>> {
        self.nodes.get(&key)
    }

    /// Whether both stores are the very same version
    pub fn ptr_eq(&self, other: &NodeStore) -> bool {
        self.nodes.ptr_eq(&other.nodes)
    }

    pub fn capabilities(&self, key: NodeKey) -> StoreResult<Capabilities> {
        let node = self.get(key)?;
        self.registry.capabilities(&node.node_type)
    }

    pub fn parent(&self, key: NodeKey) -> StoreResult<Option<NodeKey>> {
        Ok(self.get(key)?.parent)
    }

    /// Ordered children; fails for leaves
    pub fn children(&self, key: NodeKey) -> StoreResult<&[NodeKey]> {
        let node = self.get(key)?;
        if self.registry.capabilities(&node.node_type)?.is_leaf() {
            return Err(StoreError::NotContainer(key));
        }
        Ok(&node.children)
    }

    pub fn index_in_parent(&self, key: NodeKey) -> StoreResult<Option<usize>> {
        let node = self.get(key)?;
        match node.parent {
            Some(parent) => Ok(self.get(parent)?.children.iter().position(|c| *c == key)),
            None => Ok(None),
        }
    }

    pub fn previous_sibling(&self, key: NodeKey) -> StoreResult<Option<NodeKey>> {
        let node = self.get(key)?;
        let Some(parent) = node.parent else {
            return Ok(None);
        };
        let siblings = &self.get(parent)?.children;
        let index = siblings.iter().position(|c| *c == key);
        Ok(index.and_then(|i| i.checked_sub(1)).map(|i| siblings[i]))
    }

    pub fn next_sibling(&self, key: NodeKey) -> StoreResult<Option<NodeKey>> {
        let node = self.get(key)?;
        let Some(parent) = node.parent else {
            return Ok(None);
        };
        let siblings = &self.get(parent)?.children;
        let index = siblings.iter().position(|c| *c == key);
        Ok(index.and_then(|i| siblings.get(i + 1)).copied())
    }

    /// Ancestors from the parent up to the root
    pub fn ancestors(&self, key: NodeKey) -> StoreResult<Vec<NodeKey>> {
        let mut ancestors = Vec::new();
        let mut current = self.get(key)?.parent;
        while let Some(k) = current {
            if ancestors.len() > self.nodes.len() {
                return Err(StoreError::invalid_structure("parent chain loops"));
            }
            ancestors.push(k);
            current = self.get(k)?.parent;
        }
        Ok(ancestors)
    }

    /// Whether `ancestor` is a strict ancestor of `key`
    pub fn is_ancestor(&self, ancestor: NodeKey, key: NodeKey) -> bool {
        self.ancestors(key)
            .map(|chain| chain.contains(&ancestor))
            .unwrap_or(false)
    }

    /// Child indices from the root down to `key`
    pub fn path_to(&self, key: NodeKey) -> StoreResult<Vec<usize>> {
        let mut path = Vec::new();
        let mut current = key;
        while let Some(parent) = self.get(current)?.parent {
            let index = self
                .get(parent)?
                .children
                .iter()
                .position(|c| *c == current)
                .ok_or_else(|| StoreError::invalid_structure(format!("{current} missing from its parent")))?;
            path.push(index);
            current = parent;
        }
        path.reverse();
        Ok(path)
    }

    /// First text-bearing node in document order under `key` (inclusive)
    pub fn first_text_descendant(&self, key: NodeKey) -> Option<NodeKey> {
        let node = self.get(key).ok()?;
        if node.is_text() {
            return Some(key);
        }
        node.children
            .iter()
            .find_map(|child| self.first_text_descendant(*child))
    }

    /// Last text-bearing node in document order under `key` (inclusive)
    pub fn last_text_descendant(&self, key: NodeKey) -> Option<NodeKey> {
        let node = self.get(key).ok()?;
        if node.is_text() {
            return Some(key);
        }
        node.children
            .iter()
            .rev()
            .find_map(|child| self.last_text_descendant(*child))
    }

    /// All keys of the subtree rooted at `key`, in document order
    pub fn subtree_keys(&self, key: NodeKey) -> StoreResult<Vec<NodeKey>> {
        let node = self.get(key)?;
        let mut collector = KeyCollector::default();
        crate::visitor::Visitor::visit_node(&mut collector, self, node);
        Ok(collector.keys)
    }

    /// All reachable keys in document order
    pub fn keys_in_order(&self) -> Vec<NodeKey> {
        let mut collector = KeyCollector::default();
        walk_document(&mut collector, self);
        collector.keys
    }

    /// Plain-text rendition: blocks separated by blank lines
    pub fn text_content(&self) -> String {
        let mut collector = TextCollector::default();
        walk_document(&mut collector, self);
        collector.finish()
    }

    // ------------------------------------------------------------------
    // Mutation primitives
    // ------------------------------------------------------------------

    /// Clone `key` and its ancestors so this store owns them exclusively
    fn touch_path(&mut self, key: NodeKey) -> StoreResult<()> {
        let limit = self.nodes.len() + 1;
        let mut current = Some(key);
        let mut steps = 0;
        while let Some(k) = current {
            steps += 1;
            if steps > limit {
                return Err(StoreError::invalid_structure("parent chain loops"));
            }
            let slot = self.nodes.get_mut(&k).ok_or(StoreError::NotFound(k))?;
            current = Arc::make_mut(slot).parent;
        }
        Ok(())
    }

    fn node_mut(&mut self, key: NodeKey) -> StoreResult<&mut Node> {
        self.touch_path(key)?;
        self.nodes
            .get_mut(&key)
            .map(Arc::make_mut)
            .ok_or(StoreError::NotFound(key))
    }

    /// Add a detached node with a fresh key
    pub fn create_node(&mut self, node_type: NodeType, content: NodeContent) -> StoreResult<NodeKey> {
        self.registry.behavior(&node_type)?;
        let node = Node::new(NodeKey::next(), node_type, content);
        let key = node.key;
        self.nodes.insert(key, Arc::new(node));
        Ok(key)
    }

    /// Add a detached node of `node_type` with that type's default content
    pub fn create_default(&mut self, node_type: NodeType) -> StoreResult<NodeKey> {
        let content = self.registry.behavior(&node_type)?.default_content();
        self.create_node(node_type, content)
    }

    /// Add a detached node that keeps a caller-supplied key
    pub fn create_with_key(
        &mut self,
        key: NodeKey,
        node_type: NodeType,
        content: NodeContent,
    ) -> StoreResult<()> {
        if self.nodes.contains_key(&key) {
            return Err(StoreError::DuplicateKey(key));
        }
        self.registry.behavior(&node_type)?;
        NodeKey::reserve(key);
        self.nodes.insert(key, Arc::new(Node::new(key, node_type, content)));
        Ok(())
    }

    /// Place `child` at `index` under `parent`.
    ///
    /// An attached child is moved: it is detached first and `index` counts
    /// positions in the parent after that removal.
    pub fn insert_child(&mut self, parent: NodeKey, index: usize, child: NodeKey) -> StoreResult<()> {
        let parent_caps = self.capabilities(parent)?;
        let child_caps = self.capabilities(child)?;

        if child == self.root {
            return Err(StoreError::invalid_structure("the root cannot be a child"));
        }
        if parent_caps.is_leaf() {
            return Err(StoreError::NotContainer(parent));
        }
        if !parent_caps.accepts(&child_caps) {
            return Err(StoreError::invalid_structure(format!(
                "{} cannot contain {}",
                self.get(parent)?.node_type,
                self.get(child)?.node_type
            )));
        }
        if child == parent || self.is_ancestor(child, parent) {
            return Err(StoreError::CycleDetected { node: child, target: parent });
        }

        self.detach(child)?;

        let parent_node = self.node_mut(parent)?;
        let index = index.min(parent_node.children.len());
        parent_node.children.insert(index, child);

        let slot = self.nodes.get_mut(&child).ok_or(StoreError::NotFound(child))?;
        Arc::make_mut(slot).parent = Some(parent);
        Ok(())
    }

    /// Unlink `key` from its parent, keeping it in the store.
    ///
    /// Returns the former parent and index, if it was attached.
    pub fn detach(&mut self, key: NodeKey) -> StoreResult<Option<(NodeKey, usize)>> {
        let Some(parent) = self.get(key)?.parent else {
            return Ok(None);
        };

        let parent_node = self.node_mut(parent)?;
        let index = parent_node
            .children
            .iter()
            .position(|c| *c == key)
            .ok_or_else(|| StoreError::invalid_structure(format!("{key} missing from its parent")))?;
        parent_node.children.remove(index);

        let slot = self.nodes.get_mut(&key).ok_or(StoreError::NotFound(key))?;
        Arc::make_mut(slot).parent = None;
        Ok(Some((parent, index)))
    }

    /// Remove `child` and its whole subtree from under `parent`
    pub fn remove_child(&mut self, parent: NodeKey, child: NodeKey) -> StoreResult<Vec<NodeKey>> {
        if self.get(child)?.parent != Some(parent) {
            return Err(StoreError::invalid_structure(format!(
                "{child} is not a child of {parent}"
            )));
        }
        self.remove_subtree(child)
    }

    /// Remove `key` and everything below it; returns the removed keys
    pub fn remove_subtree(&mut self, key: NodeKey) -> StoreResult<Vec<NodeKey>> {
        if key == self.root {
            return Err(StoreError::invalid_structure("the root cannot be removed"));
        }
        let removed = self.subtree_keys(key)?;
        self.detach(key)?;

        for k in &removed {
            self.nodes.remove(k);
        }
        Ok(removed)
    }

    /// Replace the payload of `key`
    pub fn set_content(&mut self, key: NodeKey, content: NodeContent) -> StoreResult<()> {
        self.node_mut(key)?.content = content;
        Ok(())
    }

    /// Give an empty container the placeholder its policy asks for,
    /// recursively. Returns the created keys.
    pub fn backfill(&mut self, key: NodeKey) -> StoreResult<Vec<NodeKey>> {
        let mut created = Vec::new();
        let mut current = key;
        loop {
            if !self.get(current)?.children.is_empty() {
                break;
            }
            let EmptyPolicy::Backfill(placeholder) = self.capabilities(current)?.when_empty else {
                break;
            };
            let child = self.create_default(placeholder)?;
            self.insert_child(current, 0, child)?;
            created.push(child);
            current = child;
        }
        Ok(created)
    }

    // ------------------------------------------------------------------
    // Functional variants
    // ------------------------------------------------------------------

    /// New store with `child` inserted; `self` is left untouched
    pub fn with_child_inserted(&self, parent: NodeKey, index: usize, child: NodeKey) -> StoreResult<Self> {
        let mut next = self.clone();
        next.insert_child(parent, index, child)?;
        Ok(next)
    }

    /// New store with the subtree at `child` removed
    pub fn with_child_removed(&self, parent: NodeKey, child: NodeKey) -> StoreResult<Self> {
        let mut next = self.clone();
        next.remove_child(parent, child)?;
        Ok(next)
    }

    /// New store with `key`'s content replaced
    pub fn with_content(&self, key: NodeKey, content: NodeContent) -> StoreResult<Self> {
        let mut next = self.clone();
        next.set_content(key, content)?;
        Ok(next)
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    /// Check the single-rooted-tree invariants
    pub fn validate(&self) -> StoreResult<()> {
        let root = self.get(self.root)?;
        if root.parent.is_some() {
            return Err(StoreError::invalid_structure("root has a parent"));
        }

        let mut seen = HashSet::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        seen.insert(self.root);

        while let Some(key) = stack.pop() {
            let node = self.get(key)?;
            let caps = self.registry.capabilities(&node.node_type)?;

            if caps.is_leaf() && !node.children.is_empty() {
                return Err(StoreError::NotContainer(key));
            }

            for child in &node.children {
                let child_node = self.get(*child)?;
                if child_node.parent != Some(key) {
                    return Err(StoreError::invalid_structure(format!(
                        "{child} has parent {:?}, expected {key}",
                        child_node.parent
                    )));
                }
                let child_caps = self.registry.capabilities(&child_node.node_type)?;
                if !caps.accepts(&child_caps) {
                    return Err(StoreError::invalid_structure(format!(
                        "{} cannot contain {}",
                        node.node_type, child_node.node_type
                    )));
                }
                if !seen.insert(*child) {
                    return Err(StoreError::invalid_structure(format!(
                        "{child} is reachable twice"
                    )));
                }
                stack.push(*child);
            }
        }

        if seen.len() != self.nodes.len() {
            let orphan = self
                .nodes
                .keys()
                .find(|k| !seen.contains(*k))
                .copied()
                .unwrap_or(self.root);
            return Err(StoreError::invalid_structure(format!(
                "{orphan} is not reachable from the root"
            )));
        }

        Ok(())
    }
}
