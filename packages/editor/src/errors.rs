//! Error types for the editor

use folio_model::{NodeKey, StoreError};
use thiserror::Error;

pub type EditorResult<T> = Result<T, EditorError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditorError {
    #[error("Node not found: {0}")]
    NotFound(NodeKey),

    #[error("Invalid structure: {0}")]
    InvalidStructure(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Selection cannot be resolved")]
    SelectionUnresolvable,

    #[error("Update aborted: {0}")]
    Aborted(String),
}

impl EditorError {
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }

    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure(message.into())
    }

    /// Recoverable errors turn the failing operation into a no-op; the
    /// rest abort the whole update
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EditorError::NotFound(_)
                | EditorError::InvalidOperation(_)
                | EditorError::SelectionUnresolvable
        )
    }
}

impl From<StoreError> for EditorError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(key) => EditorError::NotFound(key),
            StoreError::InvalidStructure(message) => EditorError::InvalidStructure(message),
            other => EditorError::InvalidStructure(other.to_string()),
        }
    }
}
