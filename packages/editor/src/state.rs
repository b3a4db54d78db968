//! # Editor State
//!
//! An immutable `(store, selection)` pair identified by a version number.
//! Cloning a state is cheap: the store is shared until a transaction writes.

use crate::errors::{EditorError, EditorResult};
use crate::normalize::document_start;
use crate::selection::Selection;
use folio_model::{NodeKey, NodeRegistry, NodeStore, SerializedNode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct EditorState {
    version: u64,
    store: NodeStore,
    selection: Selection,
}

/// Exported snapshot: the node tree plus the selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedState {
    pub root: SerializedNode,
    #[serde(default)]
    pub selection: Selection,
}

impl EditorState {
    /// Version 0: an empty paragraph with the caret inside it
    pub fn empty(registry: Arc<NodeRegistry>) -> EditorResult<Self> {
        let store = NodeStore::empty_document(registry)?;
        let selection = document_start(&store);
        Ok(Self::from_parts(0, store, selection))
    }

    /// Wrap an existing store; the store and selection are validated
    pub fn new(store: NodeStore, selection: Selection) -> EditorResult<Self> {
        store.validate()?;
        if !selection.is_valid(&store) {
            return Err(EditorError::SelectionUnresolvable);
        }
        Ok(Self::from_parts(0, store, selection))
    }

    pub(crate) fn from_parts(version: u64, store: NodeStore, selection: Selection) -> Self {
        Self {
            version,
            store,
            selection,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn root(&self) -> NodeKey {
        self.store.root()
    }

    pub fn text_content(&self) -> String {
        self.store.text_content()
    }

    /// Both states share the very same node store
    pub fn same_content(&self, other: &EditorState) -> bool {
        self.store.ptr_eq(&other.store)
    }

    pub fn to_serialized(&self) -> EditorResult<SerializedState> {
        Ok(SerializedState {
            root: self.store.to_serialized()?,
            selection: self.selection.clone(),
        })
    }

    /// Rebuild a state from its exported form.
    ///
    /// The tree is re-validated; a selection that no longer fits it is
    /// replaced by a caret at the document start.
    pub fn from_serialized(registry: Arc<NodeRegistry>, serialized: &SerializedState) -> EditorResult<Self> {
        let store = NodeStore::from_serialized(registry, &serialized.root)?;
        let selection = if serialized.selection.is_valid(&store) {
            serialized.selection.clone()
        } else {
            document_start(&store)
        };
        Ok(Self::from_parts(0, store, selection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::Point;

    fn registry() -> Arc<NodeRegistry> {
        Arc::new(NodeRegistry::with_defaults())
    }

    #[test]
    fn test_empty_state_has_caret_in_placeholder() {
        let state = EditorState::empty(registry()).unwrap();
        let keys = state.store().keys_in_order();

        assert_eq!(state.version(), 0);
        assert_eq!(keys.len(), 3);
        assert_eq!(state.selection(), &Selection::caret(Point::text(keys[2], 0)));
    }

    #[test]
    fn test_serialized_round_trip() {
        let state = EditorState::empty(registry()).unwrap();
        let json = serde_json::to_string(&state.to_serialized().unwrap()).unwrap();
        let parsed: SerializedState = serde_json::from_str(&json).unwrap();

        let restored = EditorState::from_serialized(registry(), &parsed).unwrap();
        assert_eq!(restored.store().keys_in_order(), state.store().keys_in_order());
        assert_eq!(restored.selection(), state.selection());
    }

    #[test]
    fn test_stale_selection_is_replaced_on_import() {
        let state = EditorState::empty(registry()).unwrap();
        let mut serialized = state.to_serialized().unwrap();
        serialized.selection = Selection::caret(Point::text(NodeKey::from_raw(u64::MAX), 0));

        let restored = EditorState::from_serialized(registry(), &serialized).unwrap();
        assert_eq!(restored.selection(), state.selection());
    }
}
