//! # Update Transaction
//!
//! The only way to produce a new [`EditorState`].
//!
//! ```text
//! begin(base) ──▶ fork store ──▶ ops (each behind a savepoint) ──▶ commit
//!                                                                   │
//!        cleanup rules ◀──────────────────────────────────────────┘
//!              │
//!              ▼
//!   normalize selection ──▶ validate ──▶ EditorState { version + 1 }
//! ```
//!
//! Every primitive on the working copy appends to a [`ChangeLog`] so the
//! selection can be carried through the edits at commit time. A
//! recoverable failure rolls back just the operation that raised it; a
//! structural failure poisons the transaction and commit aborts.

use crate::changes::{ChangeLog, StructuralChange};
use crate::cleanup::CleanupEngine;
use crate::commands::EditOp;
use crate::errors::{EditorError, EditorResult};
use crate::normalize::{document_start, normalize_selection};
use crate::queue::{UpdateRequest, UpdateTags};
use crate::selection::{is_editable_text, Selection};
use crate::state::EditorState;
use folio_model::{byte_offset, NodeContent, NodeKey, NodeSpec, NodeStore, NodeType, TextContent, TextFormat};
use tracing::{debug, instrument, warn};

pub struct Transaction {
    base: EditorState,
    store: NodeStore,
    selection: Selection,
    /// Log position at which `selection` was last set
    selection_mark: usize,
    log: ChangeLog,
    touched: Vec<NodeKey>,
    created: Vec<NodeKey>,
    tags: UpdateTags,
    deferred: Vec<UpdateRequest>,
    failure: Option<EditorError>,
    skipped: usize,
}

struct Savepoint {
    store: NodeStore,
    selection: Selection,
    selection_mark: usize,
    log_len: usize,
    touched_len: usize,
    created_len: usize,
    deferred_len: usize,
}

/// Result of a successful commit
#[derive(Debug)]
pub struct Committed {
    pub state: EditorState,
    pub tags: UpdateTags,
    /// Requests queued from inside the transaction, to run next
    pub deferred: Vec<UpdateRequest>,
    /// Operations that failed recoverably and were rolled back
    pub skipped: usize,
}

impl Transaction {
    /// Fork `base` into a working copy
    pub fn begin(base: &EditorState) -> Self {
        Self {
            base: base.clone(),
            store: base.store().clone(),
            selection: base.selection().clone(),
            selection_mark: 0,
            log: ChangeLog::new(),
            touched: Vec::new(),
            created: Vec::new(),
            tags: UpdateTags::default(),
            deferred: Vec::new(),
            failure: None,
            skipped: 0,
        }
    }

    pub fn with_tags(mut self, tags: UpdateTags) -> Self {
        self.tags = tags;
        self
    }

    pub fn base(&self) -> &EditorState {
        &self.base
    }

    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn tags(&self) -> &UpdateTags {
        &self.tags
    }

    pub fn tags_mut(&mut self) -> &mut UpdateTags {
        &mut self.tags
    }

    pub fn changes(&self) -> &ChangeLog {
        &self.log
    }

    /// Number of operations rolled back so far
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn is_aborted(&self) -> bool {
        self.failure.is_some()
    }

    /// Apply one edit operation behind a savepoint
    pub fn apply(&mut self, op: &EditOp) -> EditorResult<()> {
        self.run(|tx| op.apply(tx))
    }

    /// Run `f` behind a savepoint.
    ///
    /// Recoverable errors roll back whatever `f` did and are swallowed.
    /// Anything else poisons the transaction and is returned.
    pub fn run<F>(&mut self, f: F) -> EditorResult<()>
    where
        F: FnOnce(&mut Transaction) -> EditorResult<()>,
    {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }

        self.track_selection();
        let savepoint = self.savepoint();
        match f(self) {
            Ok(()) => {
                self.track_selection();
                Ok(())
            }
            Err(err) if err.is_recoverable() => {
                debug!(error = %err, "operation skipped");
                self.rollback(savepoint);
                self.skipped += 1;
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "operation broke a structural rule");
                self.rollback(savepoint);
                self.failure = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Carry the selection through the changes logged since it was set,
    /// so the next operation reads where it moved to.
    ///
    /// A selection that does not resolve yet is left for commit.
    fn track_selection(&mut self) {
        let changes = self.log.since(self.selection_mark);
        if changes.is_empty() {
            return;
        }
        if let Ok(selection) = normalize_selection(&self.selection, changes, &self.store) {
            self.selection = selection;
            self.selection_mark = self.log.len();
        }
    }

    /// Schedule a follow-up request to run after this transaction commits
    pub fn queue_update(&mut self, request: UpdateRequest) {
        self.deferred.push(request);
    }

    fn savepoint(&self) -> Savepoint {
        Savepoint {
            store: self.store.clone(),
            selection: self.selection.clone(),
            selection_mark: self.selection_mark,
            log_len: self.log.len(),
            touched_len: self.touched.len(),
            created_len: self.created.len(),
            deferred_len: self.deferred.len(),
        }
    }

    fn rollback(&mut self, savepoint: Savepoint) {
        self.store = savepoint.store;
        self.selection = savepoint.selection;
        self.selection_mark = savepoint.selection_mark;
        self.log.truncate(savepoint.log_len);
        self.touched.truncate(savepoint.touched_len);
        self.created.truncate(savepoint.created_len);
        self.deferred.truncate(savepoint.deferred_len);
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Replace the working selection; every point must address a live node
    pub fn set_selection(&mut self, selection: Selection) -> EditorResult<()> {
        match &selection {
            Selection::Range(range) => {
                for point in [&range.anchor, &range.focus] {
                    self.store.get(point.key)?;
                    if !point.is_valid(&self.store) {
                        return Err(EditorError::invalid_operation(format!(
                            "{point:?} does not address a position"
                        )));
                    }
                }
            }
            Selection::Node(keys) => {
                for key in keys {
                    self.store.get(*key)?;
                }
            }
            Selection::None => {}
        }
        self.selection = self.with_caret_format(selection);
        self.selection_mark = self.log.len();
        Ok(())
    }

    /// A caret inside text picks up that text's format
    fn with_caret_format(&self, mut selection: Selection) -> Selection {
        if let Selection::Range(range) = &mut selection {
            if range.is_collapsed() && range.anchor.is_text() {
                if let Some(text) = self.store.get(range.anchor.key).ok().and_then(|n| n.content().as_text()) {
                    range.format = text.format;
                }
            }
        }
        selection
    }

    /// Keep the selection's shape but replace its format
    pub(crate) fn set_selection_format(&mut self, format: TextFormat) {
        if let Selection::Range(range) = &mut self.selection {
            range.format = format;
        }
    }

    // ------------------------------------------------------------------
    // Logged primitives
    // ------------------------------------------------------------------

    fn touch(&mut self, key: NodeKey) {
        self.touched.push(key);
    }

    pub(crate) fn take_touched(&mut self) -> Vec<NodeKey> {
        std::mem::take(&mut self.touched)
    }

    /// Build a detached subtree from `spec`
    pub fn create(&mut self, spec: &NodeSpec) -> EditorResult<NodeKey> {
        let key = self.store.build(spec)?;
        for k in self.store.subtree_keys(key)? {
            self.touch(k);
        }
        self.created.push(key);
        Ok(key)
    }

    /// Create a detached node with explicit content
    pub fn create_node(&mut self, node_type: NodeType, content: NodeContent) -> EditorResult<NodeKey> {
        let key = self.store.create_node(node_type, content)?;
        self.touch(key);
        self.created.push(key);
        Ok(key)
    }

    /// Insert (or move) `key` to `index` under `parent`
    pub fn insert_node(&mut self, parent: NodeKey, index: usize, key: NodeKey) -> EditorResult<()> {
        let previous = match self.store.parent(key)? {
            Some(old_parent) => self.store.index_in_parent(key)?.map(|i| (old_parent, i)),
            None => None,
        };

        self.store.insert_child(parent, index, key)?;

        if let Some((old_parent, old_index)) = previous {
            self.log.push(StructuralChange::ChildRemoved {
                parent: old_parent,
                index: old_index,
            });
            self.touch(old_parent);
        }
        let index = self.store.index_in_parent(key)?.unwrap_or(index);
        self.log.push(StructuralChange::ChildInserted { parent, index });
        self.touch(parent);
        self.touch(key);
        Ok(())
    }

    /// Remove `key` with its whole subtree
    pub fn remove_node(&mut self, key: NodeKey) -> EditorResult<()> {
        if key == self.store.root() {
            return Err(EditorError::invalid_operation("the root cannot be removed"));
        }
        let Some(parent) = self.store.parent(key)? else {
            self.store.remove_subtree(key)?;
            return Ok(());
        };
        let index = self.store.index_in_parent(key)?.unwrap_or(0);
        let ancestors = self.store.ancestors(key)?;
        let removed = self.store.remove_subtree(key)?;

        self.log.push(StructuralChange::SubtreeRemoved {
            key,
            removed,
            parent,
            index,
            ancestors,
        });
        self.touch(parent);
        Ok(())
    }

    pub fn set_content(&mut self, key: NodeKey, content: NodeContent) -> EditorResult<()> {
        self.store.set_content(key, content)?;
        self.touch(key);
        Ok(())
    }

    /// Give an empty container its placeholder children
    pub(crate) fn backfill(&mut self, key: NodeKey) -> EditorResult<Vec<NodeKey>> {
        let created = self.store.backfill(key)?;
        let mut parent = key;
        for child in &created {
            self.log.push(StructuralChange::ChildInserted { parent, index: 0 });
            self.touch(*child);
            parent = *child;
        }
        Ok(created)
    }

    fn editable_text(&self, key: NodeKey) -> EditorResult<TextContent> {
        let node = self.store.get(key)?;
        if !is_editable_text(&self.store, key) {
            return Err(EditorError::invalid_operation(format!(
                "{} {key} does not hold editable text",
                node.node_type()
            )));
        }
        node.content()
            .as_text()
            .cloned()
            .ok_or_else(|| EditorError::invalid_operation(format!("{key} holds no text")))
    }

    /// Replace a segmented node (an atomic leaf holding text) with a plain
    /// text node carrying the same content; returns the key now holding
    /// the text. Other nodes come back unchanged.
    pub fn degrade_segmented(&mut self, key: NodeKey) -> EditorResult<NodeKey> {
        let node = self.store.get(key)?;
        if !node.is_text() || !self.store.capabilities(key)?.atomic {
            return Ok(key);
        }
        let content = node.content().clone();
        let parent = self
            .store
            .parent(key)?
            .ok_or_else(|| EditorError::invalid_operation(format!("{key} is detached")))?;
        let index = self.store.index_in_parent(key)?.unwrap_or(0);

        let plain = self.create_node(NodeType::TEXT, content)?;
        self.insert_node(parent, index, plain)?;
        self.log.push(StructuralChange::TextMerged {
            from: key,
            into: plain,
            offset: 0,
        });
        self.remove_node(key)?;
        debug!(%key, %plain, "segmented node degraded to text");
        Ok(plain)
    }

    /// Splice `text` into the text node `key` at char `offset`.
    ///
    /// Writing into a segmented node first degrades it to plain text.
    pub fn insert_text(&mut self, key: NodeKey, offset: usize, text: &str) -> EditorResult<()> {
        let len = self.store.get(key)?.text_len();
        if offset > len {
            return Err(EditorError::invalid_operation(format!(
                "offset {offset} is past the end of {key}"
            )));
        }
        if text.is_empty() {
            return Ok(());
        }

        let key = self.degrade_segmented(key)?;
        let mut content = self.editable_text(key)?;
        let at = byte_offset(&content.text, offset);
        content.text.insert_str(at, text);
        self.set_content(key, NodeContent::Text(content))?;
        self.log.push(StructuralChange::TextInserted {
            key,
            offset,
            len: text.chars().count(),
        });
        Ok(())
    }

    /// Delete chars `start..end` of the text node `key`
    pub fn delete_text(&mut self, key: NodeKey, start: usize, end: usize) -> EditorResult<()> {
        let end = end.min(self.store.get(key)?.text_len());
        if start >= end {
            return Ok(());
        }

        let key = self.degrade_segmented(key)?;
        let mut content = self.editable_text(key)?;

        let from = byte_offset(&content.text, start);
        let to = byte_offset(&content.text, end);
        content.text.replace_range(from..to, "");
        self.set_content(key, NodeContent::Text(content))?;
        self.log.push(StructuralChange::TextDeleted {
            key,
            offset: start,
            len: end - start,
        });
        Ok(())
    }

    /// Split the text node `key` at `offset`; the tail moves into a new
    /// sibling right after it, which is returned
    pub fn split_text(&mut self, key: NodeKey, offset: usize) -> EditorResult<NodeKey> {
        let mut content = self.editable_text(key)?;
        let len = content.text.chars().count();
        if offset == 0 || offset >= len {
            return Err(EditorError::invalid_operation(format!(
                "cannot split {key} at {offset}"
            )));
        }
        let parent = self
            .store
            .parent(key)?
            .ok_or_else(|| EditorError::invalid_operation(format!("{key} is detached")))?;
        let index = self.store.index_in_parent(key)?.unwrap_or(0);
        let node_type = self.store.get(key)?.node_type().clone();

        let at = byte_offset(&content.text, offset);
        let tail = content.text.split_off(at);
        let format = content.format;
        self.set_content(key, NodeContent::Text(content))?;

        let into = self.create_node(node_type, NodeContent::formatted(tail, format))?;
        self.store.insert_child(parent, index + 1, into)?;
        self.log.push(StructuralChange::ChildInserted {
            parent,
            index: index + 1,
        });
        self.log.push(StructuralChange::TextSplit { key, offset, into });
        Ok(into)
    }

    /// Append the text of `second` to `first` and remove `second`
    pub fn merge_text(&mut self, first: NodeKey, second: NodeKey) -> EditorResult<()> {
        if first == second {
            return Err(EditorError::invalid_operation("cannot merge a node with itself"));
        }
        let mut content = self.editable_text(first)?;
        let tail = self.editable_text(second)?;
        let offset = content.text.chars().count();

        content.text.push_str(&tail.text);
        self.set_content(first, NodeContent::Text(content))?;
        self.log.push(StructuralChange::TextMerged {
            from: second,
            into: first,
            offset,
        });
        self.remove_node(second)
    }

    // ------------------------------------------------------------------
    // Commit
    // ------------------------------------------------------------------

    /// Freeze the working copy into the next [`EditorState`].
    ///
    /// On any failure the base is left untouched and `Aborted` is returned.
    #[instrument(skip(self), fields(base = self.base.version(), changes = self.log.len()))]
    pub fn commit(mut self) -> EditorResult<Committed> {
        if let Some(err) = self.failure.take() {
            warn!(error = %err, "transaction aborted");
            return Err(EditorError::Aborted(err.to_string()));
        }

        let version = self.base.version() + 1;
        match self.finish() {
            Ok(committed) => {
                debug!(version, skipped = committed.skipped, "transaction committed");
                Ok(committed)
            }
            Err(err) => {
                warn!(error = %err, "transaction aborted");
                Err(EditorError::Aborted(err.to_string()))
            }
        }
    }

    fn finish(mut self) -> EditorResult<Committed> {
        self.drop_detached()?;
        CleanupEngine::new().run(&mut self)?;

        let changes = self.log.since(self.selection_mark);
        let selection = match normalize_selection(&self.selection, changes, &self.store) {
            Ok(selection) => selection,
            Err(err) => fallback_selection(err, &self.store)?,
        };

        self.store.validate()?;
        if !selection.is_valid(&self.store) {
            return Err(EditorError::invalid_structure("selection does not resolve"));
        }

        let state = EditorState::from_parts(self.base.version() + 1, self.store, selection);
        Ok(Committed {
            state,
            tags: self.tags,
            deferred: self.deferred,
            skipped: self.skipped,
        })
    }

    /// Discard nodes created during the transaction but never attached
    fn drop_detached(&mut self) -> EditorResult<()> {
        for key in std::mem::take(&mut self.created) {
            let detached = match self.store.get(key) {
                Ok(node) => node.parent().is_none() && key != self.store.root(),
                Err(_) => false,
            };
            if detached {
                self.store.remove_subtree(key)?;
            }
        }
        Ok(())
    }
}

/// A selection that cannot be repaired collapses to the document start;
/// only a broken tree aborts the commit
fn fallback_selection(err: EditorError, store: &NodeStore) -> EditorResult<Selection> {
    match err {
        EditorError::InvalidStructure(_) => Err(err),
        err => {
            debug!(error = %err, "selection unresolvable, collapsing to document start");
            Ok(document_start(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::Point;
    use folio_model::NodeRegistry;
    use std::sync::Arc;

    fn hello() -> (EditorState, NodeKey, NodeKey) {
        let base = EditorState::empty(Arc::new(NodeRegistry::with_defaults())).unwrap();
        let keys = base.store().keys_in_order();
        let (paragraph, text) = (keys[1], keys[2]);

        let mut tx = Transaction::begin(&base);
        tx.insert_text(text, 0, "Hello").unwrap();
        tx.set_selection(Selection::caret(Point::text(text, 5))).unwrap();
        (tx.commit().unwrap().state, paragraph, text)
    }

    #[test]
    fn test_commit_bumps_version_and_keeps_base() {
        let (state, _, text) = hello();
        let mut tx = Transaction::begin(&state);
        tx.insert_text(text, 5, "!").unwrap();
        let next = tx.commit().unwrap().state;

        assert_eq!(next.version(), state.version() + 1);
        assert_eq!(state.text_content(), "Hello");
        assert_eq!(next.text_content(), "Hello!");
    }

    #[test]
    fn test_caret_after_insertion_point_moves() {
        let (state, _, text) = hello();
        let mut tx = Transaction::begin(&state);
        tx.insert_text(text, 0, ">> ").unwrap();
        let next = tx.commit().unwrap().state;

        assert_eq!(next.selection(), &Selection::caret(Point::text(text, 8)));
    }

    #[test]
    fn test_recoverable_error_rolls_back_only_that_operation() {
        let (state, _, text) = hello();
        let mut tx = Transaction::begin(&state);

        tx.run(|tx| tx.insert_text(text, 5, " there")).unwrap();
        tx.run(|tx| {
            tx.insert_text(text, 0, "oops")?;
            tx.insert_text(NodeKey::from_raw(u64::MAX), 0, "x")
        })
        .unwrap();

        assert_eq!(tx.skipped(), 1);
        assert_eq!(tx.commit().unwrap().state.text_content(), "Hello there");
    }

    #[test]
    fn test_structural_error_aborts() {
        let (state, paragraph, _) = hello();
        let mut tx = Transaction::begin(&state);

        let err = tx
            .run(|tx| {
                let nested = tx.create(&NodeSpec::paragraph(vec![]))?;
                tx.insert_node(paragraph, 0, nested)
            })
            .unwrap_err();
        assert!(matches!(err, EditorError::InvalidStructure(_)));
        assert!(tx.is_aborted());

        let err = tx.commit().unwrap_err();
        assert!(matches!(err, EditorError::Aborted(_)));
        assert_eq!(state.text_content(), "Hello");
    }

    #[test]
    fn test_split_and_merge_text() {
        let (state, paragraph, text) = hello();
        let mut tx = Transaction::begin(&state);

        let tail = tx.split_text(text, 2).unwrap();
        assert_eq!(tx.store().children(paragraph).unwrap(), &[text, tail]);
        assert_eq!(tx.store().get(tail).unwrap().text(), Some("llo"));

        tx.merge_text(text, tail).unwrap();
        let next = tx.commit().unwrap().state;
        assert_eq!(next.store().children(paragraph).unwrap(), &[text]);
        assert_eq!(next.text_content(), "Hello");
        // caret was at the end and travelled through the split and back
        assert_eq!(next.selection(), &Selection::caret(Point::text(text, 5)));
    }

    #[test]
    fn test_unattached_nodes_are_discarded() {
        let (state, _, _) = hello();
        let mut tx = Transaction::begin(&state);
        tx.create(&NodeSpec::text("floating")).unwrap();

        let next = tx.commit().unwrap().state;
        assert_eq!(next.store().len(), state.store().len());
    }

    #[test]
    fn test_later_operation_reads_carried_selection() {
        let (state, paragraph, text) = hello();
        let mut tx = Transaction::begin(&state);

        tx.apply(&EditOp::SplitNode { point: Point::text(text, 2) }).unwrap();
        let tail = tx.store().children(paragraph).unwrap()[1];
        assert_eq!(tx.selection(), &Selection::caret(Point::text(tail, 3)));

        tx.apply(&EditOp::InsertText { text: "!".into() }).unwrap();
        assert_eq!(tx.skipped(), 0);
        assert_eq!(tx.commit().unwrap().state.text_content(), "Hello!");
    }

    #[test]
    fn test_unrepairable_selection_falls_back_to_document_start() {
        let (state, _, text) = hello();
        let start = Selection::caret(Point::text(text, 0));

        for err in [
            EditorError::SelectionUnresolvable,
            EditorError::NotFound(NodeKey::from_raw(99)),
            EditorError::invalid_operation("detached"),
        ] {
            assert_eq!(fallback_selection(err, state.store()).unwrap(), start);
        }

        let err = fallback_selection(EditorError::invalid_structure("cycle"), state.store()).unwrap_err();
        assert!(matches!(err, EditorError::InvalidStructure(_)));
    }

    #[test]
    fn test_writing_into_mention_degrades_it_to_text() {
        let (state, paragraph, _) = hello();
        let mut tx = Transaction::begin(&state);
        let mention = tx
            .create(&NodeSpec::new(NodeType::MENTION).with_content(NodeContent::text("@ann")))
            .unwrap();
        tx.insert_node(paragraph, 1, mention).unwrap();
        let with_mention = tx.commit().unwrap().state;

        let mut tx = Transaction::begin(&with_mention);
        tx.run(|tx| tx.insert_text(mention, 4, "e")).unwrap();
        assert_eq!(tx.skipped(), 0);
        let next = tx.commit().unwrap().state;

        assert!(!next.store().contains(mention));
        let plain = next.store().children(paragraph).unwrap()[1];
        let node = next.store().get(plain).unwrap();
        assert_eq!(node.node_type(), &NodeType::TEXT);
        assert_eq!(node.text(), Some("@anne"));
        assert_eq!(next.text_content(), "Hello@anne");
        assert!(with_mention.store().contains(mention));
    }

    #[test]
    fn test_plain_text_is_not_degraded() {
        let (state, _, text) = hello();
        let mut tx = Transaction::begin(&state);
        assert_eq!(tx.degrade_segmented(text).unwrap(), text);
        assert!(tx.changes().is_empty());
    }

    #[test]
    fn test_queued_updates_come_back_from_commit() {
        let (state, _, _) = hello();
        let mut tx = Transaction::begin(&state);
        tx.queue_update(UpdateRequest::op(EditOp::DeleteSelection));

        let committed = tx.commit().unwrap();
        assert_eq!(committed.deferred.len(), 1);
    }
}
