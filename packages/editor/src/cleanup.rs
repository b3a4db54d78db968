//! # Cleanup Rules
//!
//! Edits can leave nodes behind that no longer make sense: an emptied link,
//! a paragraph with no children, a text run with no chars. Before a commit
//! is validated, every node touched by the transaction runs through the
//! registered rules until nothing changes.
//!
//! Rules only ever look at a node's own [`EmptyPolicy`](folio_model::EmptyPolicy),
//! never at its type tag:
//! - `Remove` nodes disappear when empty; the parent is checked next
//! - `Backfill(t)` containers receive a fresh `t` child
//! - `Keep` nodes and atomic leaves are left alone

use crate::errors::{EditorError, EditorResult};
use crate::transaction::Transaction;
use folio_model::{EmptyPolicy, NodeKey};
use tracing::debug;

/// A rule that may repair one node; returns keys to look at next
pub trait CleanupRule: std::fmt::Debug {
    fn apply(&self, tx: &mut Transaction, key: NodeKey) -> EditorResult<Vec<NodeKey>>;
}

/// Remove empty nodes whose policy says so, cascading upwards
#[derive(Debug)]
pub struct PruneEmptyNodes;

impl CleanupRule for PruneEmptyNodes {
    fn apply(&self, tx: &mut Transaction, key: NodeKey) -> EditorResult<Vec<NodeKey>> {
        let store = tx.store();
        if key == store.root() {
            return Ok(Vec::new());
        }
        let node = store.get(key)?;
        let caps = store.capabilities(key)?;

        // a placeholder left beside content that moved in is stale
        if caps.is_container() && node.children().len() > 1 {
            let stale = node
                .children()
                .iter()
                .copied()
                .filter(|c| store.get(*c).map(|n| n.is_text() && n.text_len() == 0).unwrap_or(false))
                .collect();
            return Ok(stale);
        }
        if caps.when_empty != EmptyPolicy::Remove || caps.atomic {
            return Ok(Vec::new());
        }

        let empty = if caps.is_container() {
            node.children().is_empty()
        } else {
            node.is_text() && node.text_len() == 0
        };
        let Some(parent) = node.parent() else {
            return Ok(Vec::new());
        };
        if !empty {
            return Ok(Vec::new());
        }

        // the lone empty child of a backfilled container is its placeholder
        let parent_backfills = matches!(store.capabilities(parent)?.when_empty, EmptyPolicy::Backfill(_));
        if caps.is_leaf() && parent_backfills && store.children(parent)?.len() == 1 {
            return Ok(Vec::new());
        }

        debug!(%key, "removing empty node");
        tx.remove_node(key)?;
        Ok(vec![parent])
    }
}

/// Give empty containers the placeholder their policy asks for
#[derive(Debug)]
pub struct BackfillEmptyContainers;

impl CleanupRule for BackfillEmptyContainers {
    fn apply(&self, tx: &mut Transaction, key: NodeKey) -> EditorResult<Vec<NodeKey>> {
        let store = tx.store();
        let caps = store.capabilities(key)?;
        if !caps.is_container() || !store.children(key)?.is_empty() {
            return Ok(Vec::new());
        }
        if !matches!(caps.when_empty, EmptyPolicy::Backfill(_)) {
            return Ok(Vec::new());
        }

        debug!(%key, "backfilling empty container");
        tx.backfill(key)?;
        Ok(Vec::new())
    }
}

/// Runs every rule over the touched nodes until a fixpoint
#[derive(Debug)]
pub struct CleanupEngine {
    rules: Vec<Box<dyn CleanupRule>>,
}

impl CleanupEngine {
    /// Engine with the default rules
    pub fn new() -> Self {
        Self {
            rules: vec![Box::new(PruneEmptyNodes), Box::new(BackfillEmptyContainers)],
        }
    }

    /// Engine with a custom rule set
    pub fn with_rules(rules: Vec<Box<dyn CleanupRule>>) -> Self {
        Self { rules }
    }

    /// Repair the nodes touched by `tx`, and whatever the repairs touch
    pub fn run(&self, tx: &mut Transaction) -> EditorResult<()> {
        let mut budget = (tx.store().len() + 1) * (self.rules.len() + 1) * 4;

        loop {
            let mut work = tx.take_touched();
            if work.is_empty() {
                return Ok(());
            }
            work.sort();
            work.dedup();

            while let Some(key) = work.pop() {
                if budget == 0 {
                    return Err(EditorError::invalid_structure("cleanup does not settle"));
                }
                budget -= 1;

                for rule in &self.rules {
                    if !tx.store().contains(key) {
                        break;
                    }
                    work.extend(rule.apply(tx, key)?);
                }
            }
        }
    }
}

impl Default for CleanupEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::EditorState;
    use folio_model::{NodeRegistry, NodeSpec, NodeType};
    use std::sync::Arc;

    fn state() -> EditorState {
        EditorState::empty(Arc::new(NodeRegistry::with_defaults())).unwrap()
    }

    #[test]
    fn test_empty_link_cascades_to_placeholder() {
        let state = state();
        let paragraph = state.store().keys_in_order()[1];
        let mut tx = Transaction::begin(&state);

        let link = tx
            .create(&NodeSpec::new(NodeType::LINK).with_children(vec![NodeSpec::text("x")]))
            .unwrap();
        tx.insert_node(paragraph, 1, link).unwrap();
        let text = tx.store().children(link).unwrap()[0];
        tx.delete_text(text, 0, 1).unwrap();
        CleanupEngine::new().run(&mut tx).unwrap();

        // the emptied text and then the link went away; the placeholder stays
        assert!(!tx.store().contains(link));
        assert_eq!(tx.store().children(paragraph).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_text_is_kept_as_placeholder() {
        let state = state();
        let keys = state.store().keys_in_order();
        let mut tx = Transaction::begin(&state);
        tx.insert_text(keys[2], 0, "abc").unwrap();
        tx.delete_text(keys[2], 0, 3).unwrap();
        CleanupEngine::new().run(&mut tx).unwrap();

        assert_eq!(tx.store().children(keys[1]).unwrap(), &[keys[2]]);
    }

    #[test]
    fn test_removed_paragraph_backfills_root() {
        let state = state();
        let paragraph = state.store().keys_in_order()[1];
        let mut tx = Transaction::begin(&state);
        tx.remove_node(paragraph).unwrap();
        CleanupEngine::new().run(&mut tx).unwrap();

        let root = tx.store().root();
        let fresh = tx.store().children(root).unwrap()[0];
        assert_ne!(fresh, paragraph);
        assert_eq!(tx.store().children(fresh).unwrap().len(), 1);
        tx.store().validate().unwrap();
    }

    #[test]
    fn test_stale_placeholder_is_dropped() {
        let state = state();
        let keys = state.store().keys_in_order();
        let (paragraph, placeholder) = (keys[1], keys[2]);
        let mut tx = Transaction::begin(&state);
        let text = tx.create(&NodeSpec::text("moved in")).unwrap();
        tx.insert_node(paragraph, 1, text).unwrap();
        CleanupEngine::new().run(&mut tx).unwrap();

        assert!(!tx.store().contains(placeholder));
        assert_eq!(tx.store().children(paragraph).unwrap(), &[text]);
    }

    #[test]
    fn test_atomic_leaves_are_never_empty() {
        let state = state();
        let paragraph = state.store().keys_in_order()[1];
        let mut tx = Transaction::begin(&state);
        let br = tx.create(&NodeSpec::new(NodeType::LINE_BREAK)).unwrap();
        tx.insert_node(paragraph, 1, br).unwrap();
        CleanupEngine::new().run(&mut tx).unwrap();

        assert!(tx.store().contains(br));
    }
}
