//! # Selection Model
//!
//! A selection addresses the document through stable node keys:
//!
//! - A **text point** `(key, offset)` sits between chars of a text node
//! - An **element point** `(key, offset)` sits between children of a container
//!
//! Points are ordered in document order by their root path followed by the
//! offset, which makes an element point sort just before anything inside the
//! child it precedes.

use crate::errors::{EditorError, EditorResult};
use folio_model::{NodeKey, NodeStore, TextFormat};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PointKind {
    Text,
    Element,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub key: NodeKey,
    pub offset: usize,
    #[serde(rename = "type")]
    pub kind: PointKind,
}

impl Point {
    pub fn text(key: NodeKey, offset: usize) -> Self {
        Self {
            key,
            offset,
            kind: PointKind::Text,
        }
    }

    pub fn element(key: NodeKey, offset: usize) -> Self {
        Self {
            key,
            offset,
            kind: PointKind::Element,
        }
    }

    pub fn is_text(&self) -> bool {
        self.kind == PointKind::Text
    }

    /// Whether the point addresses a live position in `store`
    pub fn is_valid(&self, store: &NodeStore) -> bool {
        let (Ok(node), Ok(caps)) = (store.get(self.key), store.capabilities(self.key)) else {
            return false;
        };
        match self.kind {
            PointKind::Text => {
                let len = text_len(store, self.key);
                let inside_atomic = caps.atomic && self.offset > 0 && self.offset < len;
                node.is_text() && self.offset <= len && !inside_atomic
            }
            PointKind::Element => caps.is_container() && self.offset <= node.children().len(),
        }
    }
}

/// Anchor/focus pair plus the format applied to text typed at a caret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSelection {
    pub anchor: Point,
    pub focus: Point,
    #[serde(default, skip_serializing_if = "TextFormat::is_empty")]
    pub format: TextFormat,
}

impl RangeSelection {
    pub fn new(anchor: Point, focus: Point) -> Self {
        Self {
            anchor,
            focus,
            format: TextFormat::empty(),
        }
    }

    pub fn caret(point: Point) -> Self {
        Self::new(point, point)
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    /// Focus comes before anchor
    pub fn is_backward(&self, store: &NodeStore) -> EditorResult<bool> {
        Ok(compare_points(store, &self.anchor, &self.focus)? == Ordering::Greater)
    }

    /// The earlier of anchor and focus
    pub fn start(&self, store: &NodeStore) -> EditorResult<Point> {
        Ok(if self.is_backward(store)? { self.focus } else { self.anchor })
    }

    /// The later of anchor and focus
    pub fn end(&self, store: &NodeStore) -> EditorResult<Point> {
        Ok(if self.is_backward(store)? { self.anchor } else { self.focus })
    }

    /// Start and end in document order
    pub fn ordered(&self, store: &NodeStore) -> EditorResult<(Point, Point)> {
        if self.is_backward(store)? {
            Ok((self.focus, self.anchor))
        } else {
            Ok((self.anchor, self.focus))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Selection {
    Range(RangeSelection),
    /// Whole nodes, e.g. a clicked decorator
    Node(BTreeSet<NodeKey>),
    #[default]
    None,
}

impl Selection {
    pub fn caret(point: Point) -> Self {
        Selection::Range(RangeSelection::caret(point))
    }

    pub fn range(anchor: Point, focus: Point) -> Self {
        Selection::Range(RangeSelection::new(anchor, focus))
    }

    pub fn nodes(keys: impl IntoIterator<Item = NodeKey>) -> Self {
        Selection::Node(keys.into_iter().collect())
    }

    pub fn as_range(&self) -> Option<&RangeSelection> {
        match self {
            Selection::Range(range) => Some(range),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Selection::None)
    }

    pub fn is_valid(&self, store: &NodeStore) -> bool {
        match self {
            Selection::Range(range) => range.anchor.is_valid(store) && range.focus.is_valid(store),
            Selection::Node(keys) => !keys.is_empty() && keys.iter().all(|k| store.contains(*k)),
            Selection::None => true,
        }
    }
}

/// Order two points in document order
pub fn compare_points(store: &NodeStore, a: &Point, b: &Point) -> EditorResult<Ordering> {
    Ok(position(store, a)?.cmp(&position(store, b)?))
}

/// Root path of the point's node followed by its offset
pub(crate) fn position(store: &NodeStore, point: &Point) -> EditorResult<Vec<usize>> {
    let mut path = store.path_to(point.key)?;
    path.push(point.offset);
    Ok(path)
}

/// First caret position inside `key`
pub fn start_of(store: &NodeStore, key: NodeKey) -> EditorResult<Point> {
    let caps = store.capabilities(key)?;
    if caps.is_container() {
        return Ok(resolve_point(store, Point::element(key, 0)));
    }
    if is_editable_text(store, key) {
        return Ok(Point::text(key, 0));
    }
    beside(store, key, false)
}

/// Last caret position inside `key`
pub fn end_of(store: &NodeStore, key: NodeKey) -> EditorResult<Point> {
    let caps = store.capabilities(key)?;
    if caps.is_container() {
        let len = store.children(key)?.len();
        return Ok(resolve_point(store, Point::element(key, len)));
    }
    if is_editable_text(store, key) {
        return Ok(Point::text(key, text_len(store, key)));
    }
    beside(store, key, true)
}

/// Element point in the parent just before (or after) `key`
pub(crate) fn beside(store: &NodeStore, key: NodeKey, after: bool) -> EditorResult<Point> {
    let parent = store
        .parent(key)?
        .ok_or_else(|| EditorError::invalid_operation(format!("{key} has no parent")))?;
    let index = store.index_in_parent(key)?.unwrap_or(0);
    Ok(Point::element(parent, index + usize::from(after)))
}

/// Move an element point onto an adjacent text node when there is one,
/// preferring the start of the following child over the end of the
/// preceding one. Descends through containers.
pub(crate) fn resolve_point(store: &NodeStore, point: Point) -> Point {
    let mut point = point;
    loop {
        if point.kind != PointKind::Element {
            return point;
        }
        let Ok(children) = store.children(point.key) else {
            return point;
        };
        let next = children.get(point.offset).copied();
        let previous = point
            .offset
            .checked_sub(1)
            .and_then(|i| children.get(i))
            .copied();

        point = match (next, previous) {
            (Some(child), _) if is_editable_text(store, child) => return Point::text(child, 0),
            (_, Some(child)) if is_editable_text(store, child) => {
                return Point::text(child, text_len(store, child))
            }
            (Some(child), _) if is_container(store, child) => Point::element(child, 0),
            (None, Some(child)) if is_container(store, child) => {
                let len = store.children(child).map(|c| c.len()).unwrap_or(0);
                Point::element(child, len)
            }
            _ => return point,
        };
    }
}

/// A text node a caret may sit inside
pub(crate) fn is_editable_text(store: &NodeStore, key: NodeKey) -> bool {
    match (store.get(key), store.capabilities(key)) {
        (Ok(node), Ok(caps)) => node.is_text() && !caps.atomic,
        _ => false,
    }
}

pub(crate) fn is_container(store: &NodeStore, key: NodeKey) -> bool {
    store
        .capabilities(key)
        .map(|caps| caps.is_container())
        .unwrap_or(false)
}

pub(crate) fn text_len(store: &NodeStore, key: NodeKey) -> usize {
    store
        .get(key)
        .map(|node| store.registry().content_len(node.node_type(), node.content()))
        .unwrap_or(0)
}
