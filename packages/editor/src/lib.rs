//! # Folio Editor
//!
//! Editing core: versioned snapshots, transactions, selection, reconciliation
//! and history on top of the `folio-model` node store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ model: copy-on-write NodeStore + registry   │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor: state lifecycle                     │
//! │  - Transactions over a forked store         │
//! │  - Edit operations + cleanup rules          │
//! │  - Selection carried through every edit     │
//! │  - Reconciler: minimal mutation lists       │
//! │  - History with coalescing                  │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ view layer (out of tree): applies mutations │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Snapshots are immutable**: a commit produces a new version, never
//!    edits the old one
//! 2. **All-or-nothing commits**: an aborted transaction leaves no trace
//! 3. **Keys, not positions**: nodes and selection points survive edits
//!    around them
//! 4. **Single writer**: requests are serialized through one queue
//!
//! ## Usage
//!
//! ```rust
//! use folio_editor::{EditOp, Editor, UpdateRequest, UpdateTags};
//! use folio_editor::config::EditorConfig;
//! use folio_model::NodeRegistry;
//! use std::sync::Arc;
//!
//! let mut editor = Editor::new(Arc::new(NodeRegistry::with_defaults()), EditorConfig::default()).unwrap();
//!
//! for c in ["a", "b", "c"] {
//!     let request = UpdateRequest::op(EditOp::InsertText { text: c.into() })
//!         .with_tags(UpdateTags::merge("typing"));
//!     editor.update(request).unwrap();
//! }
//! assert_eq!(editor.state().text_content(), "abc");
//!
//! // one undo step for the whole word
//! editor.undo().unwrap();
//! assert_eq!(editor.state().text_content(), "");
//! ```

mod changes;
mod cleanup;
mod commands;
pub mod config;
mod editor;
mod errors;
mod history;
mod mutations;
mod normalize;
mod queue;
mod reconciler;
mod selection;
mod state;
mod transaction;

pub use changes::{ChangeLog, StructuralChange};
pub use cleanup::{BackfillEmptyContainers, CleanupEngine, CleanupRule, PruneEmptyNodes};
pub use commands::EditOp;
pub use editor::{CommitEvent, CommitListener, CommitOutcome, Editor};
pub use errors::{EditorError, EditorResult};
pub use history::{HistoryAction, HistoryEntry, HistoryManager};
pub use mutations::{apply_all, Mutation, MutationError};
pub use normalize::{document_start, normalize_selection};
pub use queue::{PendingUpdate, UpdateBody, UpdateFn, UpdateQueue, UpdateRequest, UpdateTags};
pub use reconciler::{diff, diff_stores};
pub use selection::{compare_points, end_of, start_of, Point, PointKind, RangeSelection, Selection};
pub use state::{EditorState, SerializedState};
pub use transaction::{Committed, Transaction};

// Re-export common model types for convenience
pub use folio_model::{NodeKey, NodeRegistry, NodeSpec, NodeStore};
