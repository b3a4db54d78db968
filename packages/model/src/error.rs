use crate::key::NodeKey;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Node not found: {0}")]
    NotFound(NodeKey),

    #[error("Unknown node type: {0}")]
    UnknownType(String),

    #[error("Node {0} cannot have children")]
    NotContainer(NodeKey),

    #[error("Invalid structure: {0}")]
    InvalidStructure(String),

    #[error("Moving {node} under {target} would create a cycle")]
    CycleDetected { node: NodeKey, target: NodeKey },

    #[error("Duplicate node key: {0}")]
    DuplicateKey(NodeKey),
}

impl StoreError {
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure(message.into())
    }

    pub fn unknown_type(name: impl Into<String>) -> Self {
        Self::UnknownType(name.into())
    }

    /// Stale key references are recoverable; everything else is a broken tree
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
