//! # Folio Model
//!
//! Document model for the folio editing core.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ model: nodes + copy-on-write NodeStore      │
//! │  - Stable keys, open node types             │
//! │  - Capability registry (node plugins)       │
//! │  - Structural primitives + validation       │
//! │  - Interchange tree (serde)                 │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor: transactions, selection, reconciler │
//! │         and history over NodeStore versions │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use folio_model::{NodeContent, NodeRegistry, NodeStore, NodeType};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(NodeRegistry::with_defaults());
//! let store = NodeStore::empty_document(registry).unwrap();
//!
//! let paragraph = store.children(store.root()).unwrap()[0];
//! let text = store.children(paragraph).unwrap()[0];
//!
//! // Functional update: the original store is untouched
//! let next = store.with_content(text, NodeContent::text("Hello")).unwrap();
//! assert_eq!(store.text_content(), "");
//! assert_eq!(next.text_content(), "Hello");
//! assert_eq!(next.get(paragraph).unwrap().node_type(), &NodeType::PARAGRAPH);
//! ```

pub mod capability;
pub mod error;
pub mod key;
pub mod node;
mod node_map;
pub mod serialize;
pub mod store;
pub mod visitor;

pub use capability::{Accepts, BuiltinNode, Capabilities, DecoratorNode, EmptyPolicy, NodeBehavior, NodeRegistry};
pub use error::{StoreError, StoreResult};
pub use key::NodeKey;
pub use node::{byte_offset, Node, NodeContent, NodeType, TextContent, TextFormat};
pub use serialize::{NodeSpec, SerializedNode};
pub use store::NodeStore;
pub use visitor::{walk_document, walk_node, KeyCollector, TextCollector, Visitor};
