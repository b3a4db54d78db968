//! # Reconciler
//!
//! Computes the [`Mutation`]s between two committed states.
//!
//! Both trees are walked by key, descending only where the node handles
//! differ. Path copying guarantees that a subtree whose root handle is
//! shared between the two stores is identical, so the work done is
//! proportional to what changed, not to the document size.
//!
//! ```text
//! 1. Delete   removed nodes with nothing surviving below them (post-order)
//! 2. Create / Move / UpdateContent   changed parents in next-tree pre-order,
//!             each child list fixed up left to right
//! 3. Delete   removed nodes whose surviving children have moved out
//! ```

use crate::mutations::{Mutation, MutationError};
use crate::state::EditorState;
use folio_model::{Node, NodeKey, NodeStore};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Mutations that turn `prev` into `next`
#[instrument(skip_all, fields(prev = prev.version(), next = next.version()))]
pub fn diff(prev: &EditorState, next: &EditorState) -> Result<Vec<Mutation>, MutationError> {
    let mutations = diff_stores(prev.store(), next.store())?;
    debug!(mutations = mutations.len(), "reconciled");
    Ok(mutations)
}

/// Store-level [`diff`]
pub fn diff_stores(prev: &NodeStore, next: &NodeStore) -> Result<Vec<Mutation>, MutationError> {
    if prev.ptr_eq(next) {
        return Ok(Vec::new());
    }
    if prev.root() != next.root() {
        return Err(MutationError::RootChanged {
            prev: prev.root(),
            next: next.root(),
        });
    }

    let mut reconciler = Reconciler {
        prev,
        next,
        lists: HashMap::new(),
        parents: HashMap::new(),
        out: Vec::new(),
    };

    let mut removed = Vec::new();
    reconciler.collect_removed(prev.root(), &mut removed)?;

    for (key, _) in removed.iter().filter(|(_, survivors)| !survivors) {
        reconciler.delete(*key)?;
    }
    reconciler.reconcile(next.root())?;
    for (key, _) in removed.iter().filter(|(_, survivors)| *survivors) {
        reconciler.delete(*key)?;
    }

    Ok(reconciler.out)
}

struct Reconciler<'a> {
    prev: &'a NodeStore,
    next: &'a NodeStore,
    /// Child lists as they stand after the mutations emitted so far
    lists: HashMap<NodeKey, Vec<NodeKey>>,
    /// Parents that differ from `prev` after the mutations emitted so far
    parents: HashMap<NodeKey, Option<NodeKey>>,
    out: Vec<Mutation>,
}

impl<'a> Reconciler<'a> {
    fn prev_node(&self, key: NodeKey) -> Result<&'a Arc<Node>, MutationError> {
        self.prev.get_shared(key).ok_or(MutationError::NodeNotFound(key))
    }

    fn next_node(&self, key: NodeKey) -> Result<&'a Arc<Node>, MutationError> {
        self.next.get_shared(key).ok_or(MutationError::NodeNotFound(key))
    }

    fn unchanged(&self, key: NodeKey) -> bool {
        match (self.prev.get_shared(key), self.next.get_shared(key)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Post-order walk of `prev` collecting keys missing from `next`, each
    /// flagged with whether anything below it survives. Returns whether
    /// anything in the subtree survives.
    fn collect_removed(&self, key: NodeKey, removed: &mut Vec<(NodeKey, bool)>) -> Result<bool, MutationError> {
        if self.unchanged(key) {
            return Ok(true);
        }
        let node = self.prev_node(key)?;

        let mut survivors = false;
        for child in node.children() {
            survivors |= self.collect_removed(*child, removed)?;
        }

        if self.next.contains(key) {
            return Ok(true);
        }
        removed.push((key, survivors));
        Ok(survivors)
    }

    fn current_parent(&self, key: NodeKey) -> Option<NodeKey> {
        match self.parents.get(&key) {
            Some(parent) => *parent,
            None => self.prev.get_shared(key).and_then(|n| n.parent()),
        }
    }

    fn list(&mut self, key: NodeKey) -> &mut Vec<NodeKey> {
        let prev = self.prev;
        self.lists.entry(key).or_insert_with(|| {
            prev.get_shared(key)
                .map(|n| n.children().to_vec())
                .unwrap_or_default()
        })
    }

    fn detach(&mut self, key: NodeKey) {
        if let Some(parent) = self.current_parent(key) {
            self.list(parent).retain(|k| *k != key);
        }
        self.parents.insert(key, None);
    }

    fn delete(&mut self, key: NodeKey) -> Result<(), MutationError> {
        self.detach(key);
        self.out.push(Mutation::Delete { key });
        Ok(())
    }

    /// Fix up `key`'s content and child list, then recurse into children
    fn reconcile(&mut self, key: NodeKey) -> Result<(), MutationError> {
        if self.unchanged(key) {
            return Ok(());
        }
        let node = self.next_node(key)?;

        if let Some(old) = self.prev.get_shared(key) {
            let same = self
                .next
                .registry()
                .content_eq(node.node_type(), old.content(), node.content());
            if !same {
                self.out.push(Mutation::UpdateContent {
                    key,
                    content: node.content().clone(),
                });
            }
        }

        for (index, child) in node.children().iter().enumerate() {
            if self.list(key).get(index) == Some(child) {
                continue;
            }

            if self.prev.contains(*child) {
                self.detach(*child);
                self.out.push(Mutation::Move {
                    key: *child,
                    parent: key,
                    index,
                });
            } else {
                let created = self.next_node(*child)?;
                self.out.push(Mutation::Create {
                    key: *child,
                    parent: key,
                    index,
                    node_type: created.node_type().clone(),
                    content: created.content().clone(),
                });
            }

            let list = self.list(key);
            let at = index.min(list.len());
            list.insert(at, *child);
            self.parents.insert(*child, Some(key));
        }

        for child in node.children() {
            self.reconcile(*child)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::EditOp;
    use crate::mutations::apply_all;
    use crate::selection::{Point, Selection};
    use crate::transaction::Transaction;
    use folio_model::{NodeContent, NodeRegistry, NodeSpec};

    fn commit(state: &EditorState, ops: &[EditOp]) -> EditorState {
        let mut tx = Transaction::begin(state);
        for op in ops {
            tx.apply(op).unwrap();
        }
        tx.commit().unwrap().state
    }

    fn two_paragraphs() -> (EditorState, Vec<NodeKey>) {
        let empty = EditorState::empty(Arc::new(NodeRegistry::with_defaults())).unwrap();
        let root = empty.root();
        let first = empty.store().children(root).unwrap()[0];
        let state = commit(
            &empty,
            &[
                EditOp::RemoveNode { key: first },
                EditOp::InsertNode {
                    parent: root,
                    index: 0,
                    spec: NodeSpec::paragraph(vec![NodeSpec::text("one")]),
                },
                EditOp::InsertNode {
                    parent: root,
                    index: 1,
                    spec: NodeSpec::paragraph(vec![NodeSpec::text("two"), NodeSpec::text("three")]),
                },
            ],
        );
        let keys = state.store().keys_in_order();
        (state, keys)
    }

    fn assert_replays(prev: &EditorState, next: &EditorState, mutations: &[Mutation]) {
        let mut store = prev.store().clone();
        apply_all(mutations, &mut store).unwrap();
        assert_eq!(store.to_serialized().unwrap(), next.store().to_serialized().unwrap());
    }

    #[test]
    fn test_diff_against_itself_is_empty() {
        let (state, _) = two_paragraphs();
        assert!(diff(&state, &state).unwrap().is_empty());
    }

    #[test]
    fn test_single_text_edit_is_one_update() {
        let (state, keys) = two_paragraphs();
        let one = keys[2];
        let next = commit(
            &state,
            &[EditOp::InsertTextAt {
                point: Point::text(one, 3),
                text: " more".into(),
            }],
        );

        let mutations = diff(&state, &next).unwrap();
        assert_eq!(
            mutations,
            vec![Mutation::UpdateContent {
                key: one,
                content: NodeContent::text("one more"),
            }]
        );
    }

    #[test]
    fn test_block_merge_moves_children_then_deletes() {
        let (state, keys) = two_paragraphs();
        let (first, second, two, three) = (keys[1], keys[3], keys[4], keys[5]);
        let next = commit(&state, &[EditOp::MergeNodes { first, second }]);

        let mutations = diff(&state, &next).unwrap();
        assert_eq!(
            mutations,
            vec![
                Mutation::Move { key: two, parent: first, index: 1 },
                Mutation::Move { key: three, parent: first, index: 2 },
                Mutation::Delete { key: second },
            ]
        );
        assert_replays(&state, &next, &mutations);
    }

    #[test]
    fn test_created_parents_come_first() {
        let (state, _) = two_paragraphs();
        let root = state.root();
        let next = commit(
            &state,
            &[EditOp::InsertNode {
                parent: root,
                index: 1,
                spec: NodeSpec::paragraph(vec![NodeSpec::text("new")]),
            }],
        );

        let mutations = diff(&state, &next).unwrap();
        assert_eq!(mutations.len(), 2);
        let Mutation::Create { key: paragraph, index: 1, .. } = mutations[0] else {
            panic!("expected the paragraph first, got {:?}", mutations[0]);
        };
        assert!(matches!(mutations[1], Mutation::Create { parent, index: 0, .. } if parent == paragraph));
        assert_replays(&state, &next, &mutations);
    }

    #[test]
    fn test_removal_deletes_before_creates() {
        let (state, keys) = two_paragraphs();
        let root = state.root();
        let next = commit(
            &state,
            &[
                EditOp::RemoveNode { key: keys[1] },
                EditOp::RemoveNode { key: keys[3] },
            ],
        );

        // the emptied root is backfilled with a fresh paragraph
        let mutations = diff(&state, &next).unwrap();
        let first_create = mutations
            .iter()
            .position(|m| matches!(m, Mutation::Create { .. }))
            .unwrap();
        assert!(mutations[..first_create].iter().all(|m| matches!(m, Mutation::Delete { .. })));
        assert!(matches!(mutations[first_create], Mutation::Create { parent, index: 0, .. } if parent == root));
        assert_replays(&state, &next, &mutations);
    }

    #[test]
    fn test_selection_only_commit_has_no_mutations() {
        let (state, keys) = two_paragraphs();
        let next = commit(
            &state,
            &[EditOp::SetSelection {
                selection: Selection::caret(Point::text(keys[4], 1)),
            }],
        );

        assert!(diff(&state, &next).unwrap().is_empty());
    }

    #[test]
    fn test_reorder_replays() {
        let (state, keys) = two_paragraphs();
        let root = state.root();
        let next = commit(
            &state,
            &[
                EditOp::MoveNode { key: keys[3], parent: root, index: 0 },
                EditOp::MoveNode { key: keys[5], parent: keys[1], index: 0 },
            ],
        );

        let mutations = diff(&state, &next).unwrap();
        assert_replays(&state, &next, &mutations);
    }
}
