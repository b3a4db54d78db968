//! Selection normalization at commit time.
//!
//! Points are first carried through the change log, then repaired against
//! the final tree: clamped, converted to the kind their node supports,
//! moved out of atomic nodes and finally snapped onto adjacent text.

use crate::changes::StructuralChange;
use crate::errors::{EditorError, EditorResult};
use crate::selection::{beside, resolve_point, start_of, text_len, Point, RangeSelection, Selection};
use folio_model::{NodeKey, NodeStore};
use std::collections::BTreeSet;

/// Bring `selection` in line with `store` after `changes` were applied
pub fn normalize_selection(
    selection: &Selection,
    changes: &[StructuralChange],
    store: &NodeStore,
) -> EditorResult<Selection> {
    match selection {
        Selection::None => Ok(Selection::None),
        Selection::Node(keys) => {
            let live: BTreeSet<NodeKey> = keys.iter().copied().filter(|k| store.contains(*k)).collect();
            if live.is_empty() {
                Ok(Selection::None)
            } else {
                Ok(Selection::Node(live))
            }
        }
        Selection::Range(range) => {
            let anchor = normalize_point(range.anchor, changes, store)?;
            let focus = if range.focus == range.anchor {
                anchor
            } else {
                normalize_point(range.focus, changes, store)?
            };
            Ok(Selection::Range(RangeSelection {
                anchor,
                focus,
                format: range.format,
            }))
        }
    }
}

/// Caret at the very start of the document, or no selection at all
pub fn document_start(store: &NodeStore) -> Selection {
    match start_of(store, store.root()) {
        Ok(point) if point.is_valid(store) => Selection::caret(point),
        _ => Selection::None,
    }
}

fn normalize_point(
    point: Point,
    changes: &[StructuralChange],
    store: &NodeStore,
) -> EditorResult<Point> {
    let mut point = point;
    let mut fallback: &[NodeKey] = &[];
    for change in changes {
        if let StructuralChange::SubtreeRemoved { removed, ancestors, .. } = change {
            if removed.contains(&point.key) {
                fallback = ancestors;
            }
        }
        point = change.transform(point);
    }

    if !store.contains(point.key) {
        // the point's node vanished without a logged removal
        let ancestor = fallback
            .iter()
            .find(|k| store.contains(**k))
            .ok_or(EditorError::SelectionUnresolvable)?;
        point = start_of(store, *ancestor)?;
    }

    let point = fit_to_node(store, point)?;
    let point = leave_atomic(store, point)?;
    let point = resolve_point(store, point);

    if point.is_valid(store) {
        Ok(point)
    } else {
        Err(EditorError::SelectionUnresolvable)
    }
}

/// Clamp the offset and fix a point whose kind its node cannot hold
fn fit_to_node(store: &NodeStore, point: Point) -> EditorResult<Point> {
    let node = store.get(point.key)?;
    let caps = store.capabilities(point.key)?;

    if caps.is_container() {
        return Ok(Point::element(point.key, point.offset.min(node.children().len())));
    }
    if node.is_text() {
        return Ok(Point::text(point.key, point.offset.min(text_len(store, point.key))));
    }
    beside(store, point.key, point.offset > 0)
}

/// Move a point off an atomic text node to the nearer side
fn leave_atomic(store: &NodeStore, point: Point) -> EditorResult<Point> {
    if !point.is_text() || !store.capabilities(point.key)?.atomic {
        return Ok(point);
    }
    let len = text_len(store, point.key);
    beside(store, point.key, point.offset * 2 >= len && point.offset > 0)
}
