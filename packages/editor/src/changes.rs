//! Structural change log kept by a transaction.
//!
//! Every logged primitive appends an entry describing what moved where.
//! Selection normalization replays the entries recorded after the
//! selection was last set to carry its points through the edits.

use crate::selection::{Point, PointKind};
use folio_model::NodeKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralChange {
    TextInserted {
        key: NodeKey,
        offset: usize,
        len: usize,
    },
    TextDeleted {
        key: NodeKey,
        offset: usize,
        len: usize,
    },
    /// Chars from `offset` on moved into the new node `into`
    TextSplit {
        key: NodeKey,
        offset: usize,
        into: NodeKey,
    },
    /// The text of `from` was appended to `into`, starting at `offset`
    TextMerged {
        from: NodeKey,
        into: NodeKey,
        offset: usize,
    },
    ChildInserted {
        parent: NodeKey,
        index: usize,
    },
    ChildRemoved {
        parent: NodeKey,
        index: usize,
    },
    SubtreeRemoved {
        key: NodeKey,
        removed: Vec<NodeKey>,
        parent: NodeKey,
        index: usize,
        /// Parent first, up to the root
        ancestors: Vec<NodeKey>,
    },
}

impl StructuralChange {
    /// Carry `point` across this change.
    ///
    /// A point inside a removed subtree lands on the gap the subtree left
    /// in its parent.
    pub fn transform(&self, point: Point) -> Point {
        let is_text = point.kind == PointKind::Text;
        match self {
            StructuralChange::TextInserted { key, offset, len }
                if is_text && point.key == *key && *offset < point.offset =>
            {
                Point::text(point.key, point.offset + len)
            }
            StructuralChange::TextDeleted { key, offset, len }
                if is_text && point.key == *key && *offset < point.offset =>
            {
                Point::text(point.key, point.offset.saturating_sub(*len).max(*offset))
            }
            StructuralChange::TextSplit { key, offset, into }
                if is_text && point.key == *key && *offset < point.offset =>
            {
                Point::text(*into, point.offset - offset)
            }
            StructuralChange::TextMerged { from, into, offset } if is_text && point.key == *from => {
                Point::text(*into, offset + point.offset)
            }
            StructuralChange::ChildInserted { parent, index }
                if !is_text && point.key == *parent && *index < point.offset =>
            {
                Point::element(point.key, point.offset + 1)
            }
            StructuralChange::ChildRemoved { parent, index }
                if !is_text && point.key == *parent && *index < point.offset =>
            {
                Point::element(point.key, point.offset - 1)
            }
            StructuralChange::SubtreeRemoved {
                removed,
                parent,
                index,
                ..
            } => {
                if removed.contains(&point.key) {
                    Point::element(*parent, *index)
                } else if !is_text && point.key == *parent && *index < point.offset {
                    Point::element(point.key, point.offset - 1)
                } else {
                    point
                }
            }
            _ => point,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChangeLog {
    entries: Vec<StructuralChange>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: StructuralChange) {
        self.entries.push(change);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries recorded at or after `mark`
    pub fn since(&self, mark: usize) -> &[StructuralChange] {
        self.entries.get(mark..).unwrap_or(&[])
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }
}
