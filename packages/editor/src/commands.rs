//! # Edit Operations
//!
//! Intent-level operations applied inside a [`Transaction`].
//!
//! ## Semantics
//!
//! ### Text entry
//! - Typing replaces a non-collapsed selection first
//! - A caret whose format differs from the text it sits in starts a new run
//!
//! ### Deletion
//! - Nodes wholly inside a range are removed; the boundary text nodes are trimmed
//! - A range spanning blocks merges the last block's remaining children
//!   into the first block
//! - Backspace at the start of a block merges it into the previous block
//!
//! ### Structure
//! - Splits move the tail of a node into a new sibling of the same type
//! - Merges re-parent children (or append text) and delete the second node
//!
//! Every operation runs behind a savepoint: a recoverable failure leaves the
//! transaction exactly as it was before the operation.

use crate::errors::{EditorError, EditorResult};
use crate::selection::{
    beside, compare_points, end_of, is_editable_text, position, resolve_point, start_of, text_len, Point,
    PointKind, RangeSelection, Selection,
};
use crate::transaction::Transaction;
use folio_model::{Accepts, NodeContent, NodeKey, NodeSpec, NodeStore, NodeType, TextFormat};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum EditOp {
    /// Type at the selection
    InsertText { text: String },

    InsertTextAt { point: Point, text: String },

    DeleteRange { anchor: Point, focus: Point },

    DeleteSelection,

    ReplaceRange { anchor: Point, focus: Point, text: String },

    /// Backspace (`backward`) or forward delete
    DeleteCharacter { backward: bool },

    /// Split the enclosing block at the caret (Enter)
    InsertParagraph,

    /// Soft line break at the caret (Shift+Enter)
    InsertLineBreak,

    SplitNode { point: Point },

    MergeNodes { first: NodeKey, second: NodeKey },

    SetSelection { selection: Selection },

    /// Wrap contiguous siblings in a new container built from `spec`
    Wrap { keys: Vec<NodeKey>, spec: NodeSpec },

    Unwrap { key: NodeKey },

    InsertNode { parent: NodeKey, index: usize, spec: NodeSpec },

    RemoveNode { key: NodeKey },

    MoveNode { key: NodeKey, parent: NodeKey, index: usize },

    SetContent { key: NodeKey, content: NodeContent },

    /// Toggle format flags on the selected text
    SetFormat { format: TextFormat },
}

impl EditOp {
    /// Apply the operation to the working copy
    pub fn apply(&self, tx: &mut Transaction) -> EditorResult<()> {
        match self {
            EditOp::InsertText { text } => tx.insert_text_at_selection(text),
            EditOp::InsertTextAt { point, text } => {
                let caret = tx.insert_text_at_point(*point, text, None)?;
                tx.set_selection(Selection::caret(caret))
            }
            EditOp::DeleteRange { anchor, focus } => {
                let caret = tx.delete_range(*anchor, *focus)?;
                tx.set_selection(Selection::caret(caret))
            }
            EditOp::DeleteSelection => tx.delete_selection(),
            EditOp::ReplaceRange { anchor, focus, text } => {
                let caret = tx.delete_range(*anchor, *focus)?;
                let caret = tx.insert_text_at_point(caret, text, None)?;
                tx.set_selection(Selection::caret(caret))
            }
            EditOp::DeleteCharacter { backward } => tx.delete_character(*backward),
            EditOp::InsertParagraph => tx.insert_paragraph(),
            EditOp::InsertLineBreak => tx.insert_line_break(),
            EditOp::SplitNode { point } => tx.split_node(*point).map(|_| ()),
            EditOp::MergeNodes { first, second } => tx.merge_nodes(*first, *second),
            EditOp::SetSelection { selection } => tx.set_selection(selection.clone()),
            EditOp::Wrap { keys, spec } => tx.wrap(keys, spec).map(|_| ()),
            EditOp::Unwrap { key } => tx.unwrap_node(*key),
            EditOp::InsertNode { parent, index, spec } => {
                let key = tx.create(spec)?;
                tx.insert_node(*parent, *index, key)
            }
            EditOp::RemoveNode { key } => tx.remove_node(*key),
            EditOp::MoveNode { key, parent, index } => tx.insert_node(*parent, *index, *key),
            EditOp::SetContent { key, content } => tx.set_content(*key, content.clone()),
            EditOp::SetFormat { format } => tx.format_text(*format),
        }
    }
}

/// One step of backspace or forward delete
enum Step {
    /// Delete everything up to this point
    To(Point),
    /// Delete this leaf
    Remove(NodeKey),
}

impl Transaction {
    fn range_selection(&self) -> EditorResult<RangeSelection> {
        self.selection()
            .as_range()
            .cloned()
            .ok_or_else(|| EditorError::invalid_operation("no range selection"))
    }

    /// Collapse a non-collapsed selection by deleting it; returns the caret
    fn collapse_selection(&mut self) -> EditorResult<Point> {
        let range = self.range_selection()?;
        if range.is_collapsed() {
            return Ok(range.anchor);
        }
        self.delete_range(range.anchor, range.focus)
    }

    /// Type `text` at the selection using the selection's format
    pub fn insert_text_at_selection(&mut self, text: &str) -> EditorResult<()> {
        let format = self.range_selection()?.format;
        let caret = self.collapse_selection()?;
        let caret = self.insert_text_at_point(caret, text, Some(format))?;
        self.set_selection(Selection::caret(caret))?;
        self.set_selection_format(format);
        Ok(())
    }

    /// Insert `text` at `point`; returns the caret after it.
    ///
    /// With a `format`, text lands in an existing run only when the run has
    /// that exact format; otherwise a new run is created.
    pub fn insert_text_at_point(
        &mut self,
        point: Point,
        text: &str,
        format: Option<TextFormat>,
    ) -> EditorResult<Point> {
        if !point.is_valid(self.store()) {
            self.store().get(point.key)?;
            return Err(EditorError::invalid_operation(format!("{point:?} is not a position")));
        }
        let point = resolve_point(self.store(), point);

        let (parent, index) = match point.kind {
            PointKind::Text if is_editable_text(self.store(), point.key) => {
                let run_format = self
                    .store()
                    .get(point.key)?
                    .content()
                    .as_text()
                    .map(|t| t.format)
                    .unwrap_or_default();
                if format.map_or(true, |f| f == run_format) {
                    self.insert_text(point.key, point.offset, text)?;
                    return Ok(Point::text(point.key, point.offset + text.chars().count()));
                }
                self.split_for_insertion(point)?
            }
            PointKind::Text => {
                let slot = beside(self.store(), point.key, point.offset > 0)?;
                (slot.key, slot.offset)
            }
            PointKind::Element => (point.key, point.offset),
        };

        let run = self.create_node(
            NodeType::TEXT,
            NodeContent::formatted(text, format.unwrap_or_default()),
        )?;
        match self.store().capabilities(parent)?.children {
            Some(Accepts::Inlines) => self.insert_node(parent, index, run)?,
            Some(Accepts::Blocks) => {
                let paragraph = self.create(&NodeSpec::new(NodeType::PARAGRAPH))?;
                self.insert_node(paragraph, 0, run)?;
                self.insert_node(parent, index, paragraph)?;
            }
            None => return Err(EditorError::invalid_operation(format!("{parent} takes no children"))),
        }
        Ok(Point::text(run, text.chars().count()))
    }

    /// Slot in the parent where a new inline node goes for a text caret,
    /// splitting the text when the caret is inside it
    fn split_for_insertion(&mut self, point: Point) -> EditorResult<(NodeKey, usize)> {
        let len = text_len(self.store(), point.key);
        if point.offset == 0 {
            let slot = beside(self.store(), point.key, false)?;
            return Ok((slot.key, slot.offset));
        }
        if point.offset < len {
            self.split_text(point.key, point.offset)?;
        }
        let slot = beside(self.store(), point.key, true)?;
        Ok((slot.key, slot.offset))
    }

    /// Delete everything between two points; returns the collapsed caret
    pub fn delete_range(&mut self, anchor: Point, focus: Point) -> EditorResult<Point> {
        for point in [&anchor, &focus] {
            self.store().get(point.key)?;
            if !point.is_valid(self.store()) {
                return Err(EditorError::invalid_operation(format!("{point:?} is not a position")));
            }
        }
        let (start, end) = match compare_points(self.store(), &anchor, &focus)? {
            Ordering::Greater => (focus, anchor),
            _ => (anchor, focus),
        };
        let start = resolve_point(self.store(), start);
        let end = resolve_point(self.store(), end);
        if start == end {
            return Ok(start);
        }

        if start.key == end.key && start.is_text() {
            self.delete_text(start.key, start.offset, end.offset)?;
            return Ok(start);
        }

        let covered = covered_nodes(
            self.store(),
            &position(self.store(), &start)?,
            &position(self.store(), &end)?,
        )?;
        let start_block = enclosing_block(self.store(), start.key)?;
        let end_block = enclosing_block(self.store(), end.key)?;

        for key in covered {
            if self.store().contains(key) {
                self.remove_node(key)?;
            }
        }
        if start.is_text() && is_editable_text(self.store(), start.key) {
            self.delete_text(start.key, start.offset, usize::MAX)?;
        }
        if end.is_text() && is_editable_text(self.store(), end.key) {
            self.delete_text(end.key, 0, end.offset)?;
        }

        if start_block != end_block && self.can_merge_blocks(start_block, end_block)? {
            self.append_children(start_block, end_block)?;
            self.remove_node(end_block)?;
        }
        Ok(start)
    }

    fn can_merge_blocks(&self, first: NodeKey, second: NodeKey) -> EditorResult<bool> {
        let store = self.store();
        let root = store.root();
        if first == root || second == root || store.is_ancestor(first, second) || store.is_ancestor(second, first) {
            return Ok(false);
        }
        let caps = store.capabilities(first)?;
        for child in store.children(second)? {
            if !caps.accepts(&store.capabilities(*child)?) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Move every child of `from` to the end of `into`, in order
    fn append_children(&mut self, into: NodeKey, from: NodeKey) -> EditorResult<()> {
        let children = self.store().children(from)?.to_vec();
        let mut index = self.store().children(into)?.len();
        for child in children {
            self.insert_node(into, index, child)?;
            index += 1;
        }
        Ok(())
    }

    /// Delete the selected content or nodes
    pub fn delete_selection(&mut self) -> EditorResult<()> {
        match self.selection().clone() {
            Selection::Range(range) => {
                if range.is_collapsed() {
                    return Ok(());
                }
                let caret = self.delete_range(range.anchor, range.focus)?;
                self.set_selection(Selection::caret(caret))
            }
            Selection::Node(keys) => {
                let Some(first) = keys.iter().next().copied() else {
                    return Ok(());
                };
                let caret = beside(self.store(), first, false)?;
                self.set_selection(Selection::caret(caret))?;
                for key in keys {
                    if self.store().contains(key) {
                        self.remove_node(key)?;
                    }
                }
                Ok(())
            }
            Selection::None => Err(EditorError::invalid_operation("nothing is selected")),
        }
    }

    /// Backspace or forward delete at the selection
    pub fn delete_character(&mut self, backward: bool) -> EditorResult<()> {
        let range = match self.selection() {
            Selection::Range(range) if range.is_collapsed() => range.clone(),
            _ => return self.delete_selection(),
        };
        let caret = resolve_point(self.store(), range.anchor);
        let step = if backward {
            previous_step(self.store(), caret)?
        } else {
            next_step(self.store(), caret)?
        };

        match step {
            None => Err(EditorError::invalid_operation(if backward {
                "already at the document start"
            } else {
                "already at the document end"
            })),
            Some(Step::To(target)) => {
                let caret = self.delete_range(target, caret)?;
                self.set_selection(Selection::caret(caret))
            }
            Some(Step::Remove(key)) => {
                self.set_selection(Selection::caret(caret))?;
                self.remove_node(key)
            }
        }
    }

    /// Split the enclosing block at the caret; the caret moves to the new block
    pub fn insert_paragraph(&mut self) -> EditorResult<()> {
        let caret = self.collapse_selection()?;
        let caret = resolve_point(self.store(), caret);
        let block = enclosing_block(self.store(), caret.key)?;

        if block == self.store().root() {
            let paragraph = self.create(&NodeSpec::new(NodeType::PARAGRAPH))?;
            self.insert_node(block, caret.offset, paragraph)?;
            return self.set_selection(Selection::caret(Point::element(paragraph, 0)));
        }

        // at the very start a fresh block goes in front and the caret stays
        let has_content = self
            .store()
            .children(block)?
            .iter()
            .any(|c| !is_editable_text(self.store(), *c) || text_len(self.store(), *c) > 0);
        if has_content && start_of(self.store(), block)? == caret {
            let node_type = self.store().get(block)?.node_type().clone();
            let fresh = self.create(&NodeSpec::new(node_type))?;
            let parent = self.store().parent(block)?.unwrap_or(self.store().root());
            let index = self.store().index_in_parent(block)?.unwrap_or(0);
            self.insert_node(parent, index, fresh)?;
            return self.set_selection(Selection::caret(caret));
        }

        let fresh = self.split_up_to(caret, block)?;
        let caret = start_of(self.store(), fresh)?;
        self.set_selection(Selection::caret(caret))
    }

    /// Split every node from the caret up to and including `block`;
    /// returns the new block holding everything after the caret
    fn split_up_to(&mut self, caret: Point, block: NodeKey) -> EditorResult<NodeKey> {
        let (mut node, mut index) = match caret.kind {
            PointKind::Element => (caret.key, caret.offset),
            PointKind::Text => self.split_for_insertion(caret)?,
        };

        loop {
            let source = self.store().get(node)?;
            let at_end = index >= source.children().len();
            let (node_type, content) = if node == block && at_end && source.node_type() == &NodeType::HEADING {
                (NodeType::PARAGRAPH, NodeContent::Empty)
            } else {
                (source.node_type().clone(), source.content().clone())
            };

            let parent = self
                .store()
                .parent(node)?
                .ok_or_else(|| EditorError::invalid_operation(format!("cannot split {node}")))?;
            let at = self.store().index_in_parent(node)?.unwrap_or(0) + 1;

            let sibling = self.create_node(node_type, content)?;
            self.insert_node(parent, at, sibling)?;
            let tail = self.store().children(node)?.get(index..).unwrap_or(&[]).to_vec();
            for (i, child) in tail.into_iter().enumerate() {
                self.insert_node(sibling, i, child)?;
            }

            if node == block {
                return Ok(sibling);
            }
            node = parent;
            index = at;
        }
    }

    /// Insert a line break at the caret
    pub fn insert_line_break(&mut self) -> EditorResult<()> {
        let caret = self.collapse_selection()?;
        let caret = resolve_point(self.store(), caret);
        let (parent, index) = match caret.kind {
            PointKind::Text => self.split_for_insertion(caret)?,
            PointKind::Element => (caret.key, caret.offset),
        };
        if self.store().capabilities(parent)?.children != Some(Accepts::Inlines) {
            return Err(EditorError::invalid_operation(format!("{parent} does not take inline content")));
        }

        let br = self.create(&NodeSpec::new(NodeType::LINE_BREAK))?;
        self.insert_node(parent, index, br)?;
        self.set_selection(Selection::caret(Point::element(parent, index + 1)))
    }

    /// Split the node holding `point` in two; returns the new right half
    pub fn split_node(&mut self, point: Point) -> EditorResult<NodeKey> {
        if !point.is_valid(self.store()) {
            self.store().get(point.key)?;
            return Err(EditorError::invalid_operation(format!("{point:?} is not a position")));
        }
        match point.kind {
            PointKind::Text => self.split_text(point.key, point.offset),
            PointKind::Element => {
                if point.key == self.store().root() {
                    return Err(EditorError::invalid_operation("the root cannot be split"));
                }
                self.split_up_to(point, point.key)
            }
        }
    }

    /// Merge `second` into `first`
    pub fn merge_nodes(&mut self, first: NodeKey, second: NodeKey) -> EditorResult<()> {
        let store = self.store();
        store.get(first)?;
        store.get(second)?;
        if first == second {
            return Err(EditorError::invalid_operation("cannot merge a node with itself"));
        }

        if is_editable_text(store, first) && is_editable_text(store, second) {
            return self.merge_text(first, second);
        }
        let both_containers = store.capabilities(first)?.is_container() && store.capabilities(second)?.is_container();
        if !both_containers || !self.can_merge_blocks(first, second)? {
            return Err(EditorError::invalid_operation(format!("{first} and {second} cannot be merged")));
        }
        self.append_children(first, second)?;
        self.remove_node(second)
    }

    /// Wrap contiguous siblings `keys` in a new container; returns it
    pub fn wrap(&mut self, keys: &[NodeKey], spec: &NodeSpec) -> EditorResult<NodeKey> {
        let Some(first) = keys.first().copied() else {
            return Err(EditorError::invalid_operation("nothing to wrap"));
        };
        let store = self.store();
        let parent = store
            .parent(first)?
            .ok_or_else(|| EditorError::invalid_operation(format!("{first} is detached")))?;
        let start = store.index_in_parent(first)?.unwrap_or(0);
        for (i, key) in keys.iter().enumerate() {
            if store.parent(*key)? != Some(parent) || store.index_in_parent(*key)? != Some(start + i) {
                return Err(EditorError::invalid_operation("wrapped nodes must be contiguous siblings"));
            }
        }

        let wrapper_caps = store.registry().capabilities(&spec.node_type)?;
        if !store.capabilities(parent)?.accepts(&wrapper_caps) {
            return Err(EditorError::invalid_operation(format!("{parent} cannot hold a {}", spec.node_type)));
        }
        for key in keys {
            if !wrapper_caps.accepts(&store.capabilities(*key)?) {
                return Err(EditorError::invalid_operation(format!("a {} cannot hold {key}", spec.node_type)));
            }
        }

        let wrapper = self.create(spec)?;
        self.insert_node(parent, start, wrapper)?;
        let mut index = self.store().children(wrapper)?.len();
        for key in keys {
            self.insert_node(wrapper, index, *key)?;
            index += 1;
        }
        Ok(wrapper)
    }

    /// Replace `key` by its children
    pub fn unwrap_node(&mut self, key: NodeKey) -> EditorResult<()> {
        let store = self.store();
        let parent = store
            .parent(key)?
            .ok_or_else(|| EditorError::invalid_operation(format!("{key} has no parent")))?;
        let parent_caps = store.capabilities(parent)?;
        let children = store.children(key)?.to_vec();
        for child in &children {
            if !parent_caps.accepts(&store.capabilities(*child)?) {
                return Err(EditorError::invalid_operation(format!("{parent} cannot hold {child}")));
            }
        }

        let mut index = store.index_in_parent(key)?.unwrap_or(0);
        for child in children {
            self.insert_node(parent, index, child)?;
            index += 1;
        }
        self.remove_node(key)
    }

    /// Toggle `format` on the selected text; a caret only changes the
    /// format of what is typed next
    pub fn format_text(&mut self, format: TextFormat) -> EditorResult<()> {
        let range = self.range_selection()?;
        if range.is_collapsed() {
            self.set_selection_format(range.format.toggle(format));
            return Ok(());
        }

        let backward = range.is_backward(self.store())?;
        let (start, end) = range.ordered(self.store())?;
        let mut start = resolve_point(self.store(), start);
        let mut end = resolve_point(self.store(), end);

        // cut the boundary runs so only the selected part changes
        if start.is_text() && is_editable_text(self.store(), start.key) && start.offset > 0 {
            if start.offset < text_len(self.store(), start.key) {
                let tail = self.split_text(start.key, start.offset)?;
                if end.key == start.key {
                    end = Point::text(tail, end.offset.saturating_sub(start.offset));
                } else if !end.is_text() && self.store().parent(tail)? == Some(end.key) {
                    // the tail shifted every later slot in the shared parent
                    let split_at = self.store().index_in_parent(tail)?.unwrap_or(0);
                    if end.offset >= split_at {
                        end.offset += 1;
                    }
                }
                start = Point::text(tail, 0);
            } else {
                start = beside(self.store(), start.key, true)?;
            }
        }
        if end.is_text() && is_editable_text(self.store(), end.key) {
            let len = text_len(self.store(), end.key);
            if end.offset == 0 {
                end = beside(self.store(), end.key, false)?;
            } else {
                if end.offset < len {
                    self.split_text(end.key, end.offset)?;
                }
                end = beside(self.store(), end.key, true)?;
            }
        }
        if start.is_text() {
            start = beside(self.store(), start.key, false)?;
        }

        let store = self.store();
        let covered = covered_nodes(store, &position(store, &start)?, &position(store, &end)?)?;
        let mut runs = Vec::new();
        for key in covered {
            for k in store.subtree_keys(key)? {
                if is_editable_text(store, k) {
                    runs.push(k);
                }
            }
        }
        let (Some(first), Some(last)) = (runs.first().copied(), runs.last().copied()) else {
            return Err(EditorError::invalid_operation("no text in the selection"));
        };

        let formats: Vec<TextFormat> = runs
            .iter()
            .map(|k| {
                store
                    .get(*k)
                    .ok()
                    .and_then(|n| n.content().as_text())
                    .map(|t| t.format)
                    .unwrap_or_default()
            })
            .collect();
        let all_set = formats.iter().all(|f| f.contains(format));

        for (key, current) in runs.iter().zip(formats) {
            let next = if all_set { current.toggle(format) } else { current | format };
            if next == current {
                continue;
            }
            let mut content = self
                .store()
                .get(*key)?
                .content()
                .as_text()
                .cloned()
                .unwrap_or_default();
            content.format = next;
            self.set_content(*key, NodeContent::Text(content))?;
        }

        let anchor = Point::text(first, 0);
        let focus = Point::text(last, text_len(self.store(), last));
        let selection = if backward {
            RangeSelection::new(focus, anchor)
        } else {
            RangeSelection::new(anchor, focus)
        };
        self.set_selection(Selection::Range(selection))
    }
}

/// Nearest non-inline container holding `key` (or `key` itself)
fn enclosing_block(store: &NodeStore, key: NodeKey) -> EditorResult<NodeKey> {
    let mut current = key;
    loop {
        let caps = store.capabilities(current)?;
        if caps.is_container() && !caps.inline {
            return Ok(current);
        }
        match store.parent(current)? {
            Some(parent) => current = parent,
            None => return Ok(current),
        }
    }
}

/// Top-most nodes lying entirely between two positions
fn covered_nodes(store: &NodeStore, start: &[usize], end: &[usize]) -> EditorResult<Vec<NodeKey>> {
    let mut covered = Vec::new();
    let mut path = Vec::new();
    collect_covered(store, store.root(), &mut path, start, end, &mut covered)?;
    Ok(covered)
}

fn collect_covered(
    store: &NodeStore,
    key: NodeKey,
    path: &mut Vec<usize>,
    start: &[usize],
    end: &[usize],
    covered: &mut Vec<NodeKey>,
) -> EditorResult<()> {
    if !store.capabilities(key)?.is_container() {
        return Ok(());
    }
    for (i, child) in store.children(key)?.iter().enumerate() {
        path.push(i);
        let before = path.clone();
        let mut after = path.clone();
        if let Some(last) = after.last_mut() {
            *last += 1;
        }

        if before.as_slice() >= start && after.as_slice() <= end {
            covered.push(*child);
        } else if before.as_slice() < end && after.as_slice() > start {
            collect_covered(store, *child, path, start, end, covered)?;
        }
        path.pop();
    }
    Ok(())
}

/// Where backspace at `caret` deletes to
fn previous_step(store: &NodeStore, caret: Point) -> EditorResult<Option<Step>> {
    if caret.is_text() && is_editable_text(store, caret.key) && caret.offset > 0 {
        return Ok(Some(Step::To(Point::text(caret.key, caret.offset - 1))));
    }
    let slot = match caret.kind {
        PointKind::Text => beside(store, caret.key, false)?,
        PointKind::Element => caret,
    };
    let (mut parent, mut index) = (slot.key, slot.offset);

    loop {
        if index == 0 {
            let Some(grandparent) = store.parent(parent)? else {
                return Ok(None);
            };
            index = store.index_in_parent(parent)?.unwrap_or(0);
            parent = grandparent;
            continue;
        }

        let previous = store.children(parent)?[index - 1];
        let caps = store.capabilities(previous)?;
        if is_editable_text(store, previous) {
            let len = text_len(store, previous);
            if len > 0 {
                return Ok(Some(Step::To(Point::text(previous, len - 1))));
            }
            index -= 1;
        } else if caps.is_container() && caps.inline {
            parent = previous;
            index = store.children(previous)?.len();
        } else if caps.is_container() {
            return Ok(Some(Step::To(end_of(store, previous)?)));
        } else {
            return Ok(Some(Step::Remove(previous)));
        }
    }
}

/// Where forward delete at `caret` deletes to
fn next_step(store: &NodeStore, caret: Point) -> EditorResult<Option<Step>> {
    if caret.is_text() && is_editable_text(store, caret.key) && caret.offset < text_len(store, caret.key) {
        return Ok(Some(Step::To(Point::text(caret.key, caret.offset + 1))));
    }
    let slot = match caret.kind {
        PointKind::Text => beside(store, caret.key, true)?,
        PointKind::Element => caret,
    };
    let (mut parent, mut index) = (slot.key, slot.offset);

    loop {
        let children = store.children(parent)?;
        if index >= children.len() {
            let Some(grandparent) = store.parent(parent)? else {
                return Ok(None);
            };
            index = store.index_in_parent(parent)?.unwrap_or(0) + 1;
            parent = grandparent;
            continue;
        }

        let next = children[index];
        let caps = store.capabilities(next)?;
        if is_editable_text(store, next) {
            if text_len(store, next) > 0 {
                return Ok(Some(Step::To(Point::text(next, 1))));
            }
            index += 1;
        } else if caps.is_container() && caps.inline {
            parent = next;
            index = 0;
        } else if caps.is_container() {
            return Ok(Some(Step::To(start_of(store, next)?)));
        } else {
            return Ok(Some(Step::Remove(next)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::EditorState;
    use folio_model::NodeRegistry;
    use std::sync::Arc;

    /// One paragraph per entry, each holding a single text run
    fn doc(paragraphs: &[&str]) -> (EditorState, Vec<NodeKey>, Vec<NodeKey>) {
        let base = EditorState::empty(Arc::new(NodeRegistry::with_defaults())).unwrap();
        let mut tx = Transaction::begin(&base);
        let root = tx.store().root();
        let old = tx.store().children(root).unwrap()[0];
        tx.remove_node(old).unwrap();

        let mut blocks = Vec::new();
        let mut texts = Vec::new();
        for (i, words) in paragraphs.iter().enumerate() {
            let p = tx.create(&NodeSpec::paragraph(vec![NodeSpec::text(*words)])).unwrap();
            tx.insert_node(root, i, p).unwrap();
            blocks.push(p);
            texts.push(tx.store().children(p).unwrap()[0]);
        }
        tx.set_selection(Selection::caret(Point::text(texts[0], 0))).unwrap();
        (tx.commit().unwrap().state, blocks, texts)
    }

    fn run(state: &EditorState, ops: &[EditOp]) -> EditorState {
        let mut tx = Transaction::begin(state);
        for op in ops {
            tx.apply(op).unwrap();
        }
        tx.commit().unwrap().state
    }

    fn caret(state: &EditorState) -> Point {
        state.selection().as_range().unwrap().anchor
    }

    #[test]
    fn test_typing_at_caret() {
        let (state, _, texts) = doc(&["Hello"]);
        let next = run(
            &state,
            &[
                EditOp::SetSelection { selection: Selection::caret(Point::text(texts[0], 5)) },
                EditOp::InsertText { text: " World".into() },
            ],
        );

        assert_eq!(next.text_content(), "Hello World");
        assert_eq!(caret(&next), Point::text(texts[0], 11));
    }

    #[test]
    fn test_typing_replaces_range() {
        let (state, _, texts) = doc(&["Hello World"]);
        let next = run(
            &state,
            &[
                EditOp::SetSelection {
                    selection: Selection::range(Point::text(texts[0], 6), Point::text(texts[0], 11)),
                },
                EditOp::InsertText { text: "there".into() },
            ],
        );

        assert_eq!(next.text_content(), "Hello there");
        assert_eq!(caret(&next), Point::text(texts[0], 11));
    }

    #[test]
    fn test_delete_range_across_blocks_merges() {
        let (state, blocks, texts) = doc(&["Hello", "brave", "new world"]);
        let next = run(
            &state,
            &[EditOp::DeleteRange {
                anchor: Point::text(texts[2], 4),
                focus: Point::text(texts[0], 2),
            }],
        );

        assert_eq!(next.text_content(), "Heworld");
        assert_eq!(next.store().children(next.root()).unwrap(), &[blocks[0]]);
        assert_eq!(caret(&next), Point::text(texts[0], 2));
    }

    #[test]
    fn test_delete_everything_keeps_placeholder() {
        let (state, blocks, texts) = doc(&["Hello World"]);
        let next = run(
            &state,
            &[
                EditOp::SetSelection {
                    selection: Selection::range(Point::text(texts[0], 0), Point::text(texts[0], 11)),
                },
                EditOp::DeleteSelection,
            ],
        );

        assert_eq!(next.text_content(), "");
        assert_eq!(next.store().children(blocks[0]).unwrap(), &[texts[0]]);
        assert_eq!(caret(&next), Point::text(texts[0], 0));
    }

    #[test]
    fn test_backspace_deletes_one_char() {
        let (state, _, texts) = doc(&["すし🍣"]);
        let next = run(
            &state,
            &[
                EditOp::SetSelection { selection: Selection::caret(Point::text(texts[0], 3)) },
                EditOp::DeleteCharacter { backward: true },
            ],
        );

        assert_eq!(next.text_content(), "すし");
        assert_eq!(caret(&next), Point::text(texts[0], 2));
    }

    #[test]
    fn test_backspace_at_block_start_merges_blocks() {
        let (state, blocks, texts) = doc(&["one", "two"]);
        let next = run(
            &state,
            &[
                EditOp::SetSelection { selection: Selection::caret(Point::text(texts[1], 0)) },
                EditOp::DeleteCharacter { backward: true },
            ],
        );

        assert_eq!(next.text_content(), "onetwo");
        assert_eq!(next.store().children(blocks[0]).unwrap(), &[texts[0], texts[1]]);
        assert_eq!(caret(&next), Point::text(texts[0], 3));
    }

    #[test]
    fn test_backspace_at_document_start_is_a_no_op() {
        let (state, _, _) = doc(&["one"]);
        let mut tx = Transaction::begin(&state);
        tx.apply(&EditOp::DeleteCharacter { backward: true }).unwrap();

        assert_eq!(tx.skipped(), 1);
        assert_eq!(tx.commit().unwrap().state.text_content(), "one");
    }

    #[test]
    fn test_forward_delete_at_block_end_pulls_next_block() {
        let (state, _, texts) = doc(&["one", "two"]);
        let next = run(
            &state,
            &[
                EditOp::SetSelection { selection: Selection::caret(Point::text(texts[0], 3)) },
                EditOp::DeleteCharacter { backward: false },
            ],
        );

        assert_eq!(next.text_content(), "onetwo");
        assert_eq!(caret(&next), Point::text(texts[0], 3));
    }

    #[test]
    fn test_insert_paragraph_splits_block() {
        let (state, blocks, texts) = doc(&["Hello World"]);
        let next = run(
            &state,
            &[
                EditOp::SetSelection { selection: Selection::caret(Point::text(texts[0], 5)) },
                EditOp::InsertParagraph,
            ],
        );

        let root_children = next.store().children(next.root()).unwrap();
        assert_eq!(root_children.len(), 2);
        assert_eq!(root_children[0], blocks[0]);
        assert_eq!(next.text_content(), "Hello\n\n World");

        let tail = next.store().children(root_children[1]).unwrap()[0];
        assert_eq!(caret(&next), Point::text(tail, 0));
    }

    #[test]
    fn test_insert_paragraph_at_end_backfills_new_block() {
        let (state, _, texts) = doc(&["Hi"]);
        let next = run(
            &state,
            &[
                EditOp::SetSelection { selection: Selection::caret(Point::text(texts[0], 2)) },
                EditOp::InsertParagraph,
                EditOp::InsertText { text: "there".into() },
            ],
        );

        assert_eq!(next.text_content(), "Hi\n\nthere");
        next.store().validate().unwrap();
    }

    #[test]
    fn test_insert_paragraph_at_start_keeps_caret() {
        let (state, blocks, texts) = doc(&["Hi"]);
        let next = run(&state, &[EditOp::InsertParagraph]);

        let root_children = next.store().children(next.root()).unwrap();
        assert_eq!(root_children.len(), 2);
        assert_eq!(root_children[1], blocks[0]);
        assert_eq!(caret(&next), Point::text(texts[0], 0));
    }

    #[test]
    fn test_line_break_splits_text() {
        let (state, blocks, texts) = doc(&["ab"]);
        let next = run(
            &state,
            &[
                EditOp::SetSelection { selection: Selection::caret(Point::text(texts[0], 1)) },
                EditOp::InsertLineBreak,
            ],
        );

        assert_eq!(next.text_content(), "a\nb");
        let children = next.store().children(blocks[0]).unwrap();
        assert_eq!(children.len(), 3);
        assert_eq!(caret(&next), Point::text(children[2], 0));
    }

    #[test]
    fn test_merge_nodes_reparents_children() {
        let (state, blocks, texts) = doc(&["one", "two"]);
        let next = run(&state, &[EditOp::MergeNodes { first: blocks[0], second: blocks[1] }]);

        assert!(!next.store().contains(blocks[1]));
        assert_eq!(next.store().children(blocks[0]).unwrap(), &[texts[0], texts[1]]);
    }

    #[test]
    fn test_wrap_and_unwrap() {
        let (state, blocks, texts) = doc(&["click here"]);
        let link = NodeSpec::new(NodeType::LINK)
            .with_content(NodeContent::data(serde_json::json!({ "url": "https://example.com" })));

        let mut tx = Transaction::begin(&state);
        let wrapper = tx.wrap(&[texts[0]], &link).unwrap();
        assert_eq!(tx.store().children(blocks[0]).unwrap(), &[wrapper]);
        assert_eq!(tx.store().parent(texts[0]).unwrap(), Some(wrapper));

        tx.unwrap_node(wrapper).unwrap();
        let next = tx.commit().unwrap().state;
        assert_eq!(next.store().children(blocks[0]).unwrap(), &[texts[0]]);
    }

    #[test]
    fn test_wrap_rejects_gaps() {
        let (state, _, texts) = doc(&["a", "b"]);
        let mut tx = Transaction::begin(&state);
        let err = tx.wrap(&[texts[0], texts[1]], &NodeSpec::new(NodeType::LINK)).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_format_middle_of_run() {
        let (state, blocks, texts) = doc(&["Hello World"]);
        let next = run(
            &state,
            &[
                EditOp::SetSelection {
                    selection: Selection::range(Point::text(texts[0], 6), Point::text(texts[0], 8)),
                },
                EditOp::SetFormat { format: TextFormat::BOLD },
            ],
        );

        let children = next.store().children(blocks[0]).unwrap();
        assert_eq!(children.len(), 3);
        let bold = next.store().get(children[1]).unwrap();
        assert_eq!(bold.text(), Some("Wo"));
        assert_eq!(bold.content().as_text().unwrap().format, TextFormat::BOLD);
        assert_eq!(next.text_content(), "Hello World");
    }

    #[test]
    fn test_collapsed_format_applies_to_typed_text() {
        let (state, blocks, texts) = doc(&["Hi"]);
        let next = run(
            &state,
            &[
                EditOp::SetSelection { selection: Selection::caret(Point::text(texts[0], 2)) },
                EditOp::SetFormat { format: TextFormat::ITALIC },
                EditOp::InsertText { text: "!".into() },
            ],
        );

        let children = next.store().children(blocks[0]).unwrap();
        assert_eq!(children.len(), 2);
        let run = next.store().get(children[1]).unwrap();
        assert_eq!(run.content().as_text().unwrap().format, TextFormat::ITALIC);
    }

    #[test]
    fn test_remove_root_is_recoverable() {
        let (state, _, _) = doc(&["a"]);
        let mut tx = Transaction::begin(&state);
        tx.apply(&EditOp::RemoveNode { key: state.root() }).unwrap();
        assert_eq!(tx.skipped(), 1);
    }

    #[test]
    fn test_move_into_own_subtree_aborts() {
        let (state, blocks, _) = doc(&["a"]);
        let mut tx = Transaction::begin(&state);
        let root = state.root();
        let err = tx.apply(&EditOp::MoveNode { key: root, parent: blocks[0], index: 0 }).unwrap_err();
        assert!(matches!(err, EditorError::InvalidStructure(_)));
        assert!(tx.commit().is_err());
    }

    #[test]
    fn test_op_json() {
        let op: EditOp = serde_json::from_str(r#"{"op":"insertText","text":"hi"}"#).unwrap();
        assert_eq!(op, EditOp::InsertText { text: "hi".into() });

        let op: EditOp = serde_json::from_str(r#"{"op":"deleteCharacter","backward":true}"#).unwrap();
        assert_eq!(op, EditOp::DeleteCharacter { backward: true });
    }
}
