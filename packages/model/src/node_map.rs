//! Sharded copy-on-write table from keys to shared nodes.
//!
//! A clone shares every shard. The first write after a clone copies the
//! shard directory (one pointer per shard) and then only the shard that
//! holds the written key, so a write costs a fraction of the document.

use crate::key::NodeKey;
use crate::node::Node;
use std::collections::HashMap;
use std::sync::Arc;

const SHARDS: usize = 64;

type Shard = HashMap<NodeKey, Arc<Node>>;

#[derive(Debug, Clone)]
pub(crate) struct NodeMap {
    shards: Arc<Vec<Arc<Shard>>>,
    len: usize,
}

impl NodeMap {
    pub fn new() -> Self {
        Self {
            shards: Arc::new((0..SHARDS).map(|_| Arc::new(Shard::new())).collect()),
            len: 0,
        }
    }

    fn shard_of(key: NodeKey) -> usize {
        (key.raw() % SHARDS as u64) as usize
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, key: &NodeKey) -> Option<&Arc<Node>> {
        self.shards[Self::shard_of(*key)].get(key)
    }

    pub fn contains_key(&self, key: &NodeKey) -> bool {
        self.get(key).is_some()
    }

    /// Exclusive slot for `key`; a miss copies nothing
    pub fn get_mut(&mut self, key: &NodeKey) -> Option<&mut Arc<Node>> {
        if !self.contains_key(key) {
            return None;
        }
        self.shard_mut(*key).get_mut(key)
    }

    pub fn insert(&mut self, key: NodeKey, node: Arc<Node>) -> Option<Arc<Node>> {
        let previous = self.shard_mut(key).insert(key, node);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    pub fn remove(&mut self, key: &NodeKey) -> Option<Arc<Node>> {
        if !self.contains_key(key) {
            return None;
        }
        let removed = self.shard_mut(*key).remove(key);
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    pub fn keys(&self) -> impl Iterator<Item = &NodeKey> {
        self.shards.iter().flat_map(|shard| shard.keys())
    }

    /// Both tables are the same, unwritten version
    pub fn ptr_eq(&self, other: &NodeMap) -> bool {
        Arc::ptr_eq(&self.shards, &other.shards)
    }

    fn shard_mut(&mut self, key: NodeKey) -> &mut Shard {
        let shards = Arc::make_mut(&mut self.shards);
        Arc::make_mut(&mut shards[Self::shard_of(key)])
    }
}

impl FromIterator<(NodeKey, Arc<Node>)> for NodeMap {
    fn from_iter<I: IntoIterator<Item = (NodeKey, Arc<Node>)>>(iter: I) -> Self {
        let mut map = NodeMap::new();
        for (key, node) in iter {
            map.insert(key, node);
        }
        map
    }
}
