//! # Tree Mutations
//!
//! The reconciler's output: the primitive steps that turn one committed
//! document into the next, for a view layer to mirror onto whatever surface
//! it renders.
//!
//! ## Semantics
//!
//! ### Create
//! - Adds a node under an existing parent; the node's own children follow
//!   as separate `Create`s or `Move`s
//!
//! ### Move
//! - Relocates an existing node; `index` counts positions in the target
//!   list after the node left its old place
//!
//! ### UpdateContent
//! - Atomic replacement of the payload (not a char diff)
//!
//! ### Delete
//! - Removes the node; by then every surviving descendant has moved out

use folio_model::{NodeContent, NodeKey, NodeStore, NodeType, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Mutation {
    Create {
        key: NodeKey,
        parent: NodeKey,
        index: usize,
        #[serde(rename = "type")]
        node_type: NodeType,
        content: NodeContent,
    },

    UpdateContent {
        key: NodeKey,
        content: NodeContent,
    },

    Move {
        key: NodeKey,
        parent: NodeKey,
        index: usize,
    },

    Delete {
        key: NodeKey,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MutationError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeKey),

    #[error("Parent not found: {0}")]
    ParentNotFound(NodeKey),

    #[error("Node already exists: {0}")]
    AlreadyExists(NodeKey),

    #[error("Documents have different roots: {prev} and {next}")]
    RootChanged { prev: NodeKey, next: NodeKey },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Mutation {
    /// Key of the node this mutation is about
    pub fn key(&self) -> NodeKey {
        match self {
            Mutation::Create { key, .. }
            | Mutation::UpdateContent { key, .. }
            | Mutation::Move { key, .. }
            | Mutation::Delete { key } => *key,
        }
    }

    /// Apply to `store` with validation
    pub fn apply(&self, store: &mut NodeStore) -> Result<(), MutationError> {
        self.validate(store)?;

        match self {
            Mutation::Create {
                key,
                parent,
                index,
                node_type,
                content,
            } => {
                store.create_with_key(*key, node_type.clone(), content.clone())?;
                store.insert_child(*parent, *index, *key)?;
            }
            Mutation::UpdateContent { key, content } => store.set_content(*key, content.clone())?,
            Mutation::Move { key, parent, index } => store.insert_child(*parent, *index, *key)?,
            Mutation::Delete { key } => {
                store.remove_subtree(*key)?;
            }
        }
        Ok(())
    }

    fn validate(&self, store: &NodeStore) -> Result<(), MutationError> {
        match self {
            Mutation::Create { key, parent, .. } => {
                if store.contains(*key) {
                    return Err(MutationError::AlreadyExists(*key));
                }
                if !store.contains(*parent) {
                    return Err(MutationError::ParentNotFound(*parent));
                }
            }
            Mutation::Move { key, parent, .. } => {
                if !store.contains(*key) {
                    return Err(MutationError::NodeNotFound(*key));
                }
                if !store.contains(*parent) {
                    return Err(MutationError::ParentNotFound(*parent));
                }
            }
            Mutation::UpdateContent { key, .. } | Mutation::Delete { key } => {
                if !store.contains(*key) {
                    return Err(MutationError::NodeNotFound(*key));
                }
            }
        }
        Ok(())
    }
}

/// Replay a sequence in order, stopping at the first failure
pub fn apply_all(mutations: &[Mutation], store: &mut NodeStore) -> Result<(), MutationError> {
    for mutation in mutations {
        mutation.apply(store)?;
    }
    Ok(())
}
