//! # History
//!
//! Undo/redo over committed snapshots.
//!
//! ## Design
//!
//! - Each entry holds the state right after a commit
//! - Consecutive commits sharing a merge tag within the merge window
//!   coalesce into the top entry
//! - An IME composition opens its own entry and every later composing
//!   commit folds into it, boundaries included
//! - A selection-only commit rewrites the top entry's selection and closes it
//! - Undo moves the top entry to the redo stack and returns the entry below
//!   (or the initial snapshot)
//! - Any recorded content change clears the redo stack
//!
//! ## Example
//!
//! ```rust
//! use folio_editor::{EditorState, HistoryManager};
//! use folio_editor::config::HistoryConfig;
//! use folio_model::NodeRegistry;
//! use std::sync::Arc;
//!
//! let initial = EditorState::empty(Arc::new(NodeRegistry::with_defaults())).unwrap();
//! let mut history = HistoryManager::new(initial.clone(), &HistoryConfig::default());
//!
//! assert!(!history.can_undo());
//! assert!(history.undo().is_none());
//! ```

use crate::config::HistoryConfig;
use crate::queue::UpdateTags;
use crate::state::EditorState;
use chrono::{DateTime, Utc};
use tracing::debug;

/// One undo step
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub snapshot: EditorState,
    pub merge_tag: Option<String>,
    /// Time of the last commit folded into this entry
    pub timestamp: DateTime<Utc>,
    pub composing: bool,
}

/// What [`HistoryManager::push_at`] did with a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryAction {
    Pushed,
    Merged,
    /// Selection-only change folded into the top entry
    SelectionUpdated,
    /// Not recorded (historic replay or skip-history commit)
    Ignored,
}

#[derive(Debug)]
pub struct HistoryManager {
    /// Most recent last
    undo_stack: Vec<HistoryEntry>,

    /// Most recently undone last
    redo_stack: Vec<HistoryEntry>,

    /// State before the oldest entry
    initial: EditorState,

    /// Maximum number of undo levels (0 = unlimited)
    max_levels: usize,

    merge_window_ms: u64,

    /// The next content commit opens a new entry
    boundary_pending: bool,
}

impl HistoryManager {
    pub fn new(initial: EditorState, config: &HistoryConfig) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            initial,
            max_levels: config.max_levels,
            merge_window_ms: config.merge_window_ms,
            boundary_pending: false,
        }
    }

    /// Record a commit, timestamped now
    pub fn push(&mut self, snapshot: EditorState, tags: &UpdateTags) -> HistoryAction {
        self.push_at(snapshot, tags, Utc::now())
    }

    /// Record a commit that happened at `now`
    pub fn push_at(&mut self, snapshot: EditorState, tags: &UpdateTags, now: DateTime<Utc>) -> HistoryAction {
        if tags.is_historic() || tags.skip_history {
            return HistoryAction::Ignored;
        }

        if self.current().same_content(&snapshot) {
            match self.undo_stack.last_mut() {
                Some(top) => top.snapshot = snapshot,
                None => self.initial = snapshot,
            }
            self.boundary_pending = true;
            debug!("history selection updated");
            return HistoryAction::SelectionUpdated;
        }

        self.redo_stack.clear();

        let top_composing = self.undo_stack.last().is_some_and(|top| top.composing);
        let merge = match (top_composing, tags.composing) {
            // a composition is one step whatever else happens meanwhile
            (true, true) => true,
            (false, true) => false,
            _ => !self.boundary_pending && !tags.history_boundary && self.should_merge(tags, now),
        };
        self.boundary_pending = false;

        if merge {
            if let Some(top) = self.undo_stack.last_mut() {
                top.snapshot = snapshot;
                top.timestamp = now;
                top.composing = tags.composing;
                debug!(levels = self.undo_stack.len(), "history merged");
                return HistoryAction::Merged;
            }
        }

        self.undo_stack.push(HistoryEntry {
            snapshot,
            merge_tag: tags.merge_tag.clone(),
            timestamp: now,
            composing: tags.composing,
        });

        // Trim if exceeded max levels
        if self.max_levels > 0 && self.undo_stack.len() > self.max_levels {
            let oldest = self.undo_stack.remove(0);
            self.initial = oldest.snapshot;
        }

        debug!(levels = self.undo_stack.len(), "history pushed");
        HistoryAction::Pushed
    }

    fn should_merge(&self, tags: &UpdateTags, now: DateTime<Utc>) -> bool {
        let Some(top) = self.undo_stack.last() else {
            return false;
        };
        if tags.merge_tag.is_none() || top.merge_tag != tags.merge_tag {
            return false;
        }
        let elapsed = (now - top.timestamp).num_milliseconds();
        elapsed >= 0 && elapsed.unsigned_abs() <= self.merge_window_ms
    }

    /// Step back; returns the state to restore
    pub fn undo(&mut self) -> Option<EditorState> {
        let entry = self.undo_stack.pop()?;
        self.redo_stack.push(entry);
        self.boundary_pending = true;
        debug!(levels = self.undo_stack.len(), "undo");
        Some(self.current().clone())
    }

    /// Re-apply the last undone step; returns the state to restore
    pub fn redo(&mut self) -> Option<EditorState> {
        let entry = self.redo_stack.pop()?;
        let snapshot = entry.snapshot.clone();
        self.undo_stack.push(entry);
        self.boundary_pending = true;
        debug!(levels = self.undo_stack.len(), "redo");
        Some(snapshot)
    }

    /// Snapshot the history currently sits at
    pub fn current(&self) -> &EditorState {
        self.undo_stack
            .last()
            .map(|entry| &entry.snapshot)
            .unwrap_or(&self.initial)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Number of undo levels
    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    /// Forget everything and start over from `initial`
    pub fn reset(&mut self, initial: EditorState) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.initial = initial;
        self.boundary_pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::EditOp;
    use crate::selection::{Point, Selection};
    use crate::transaction::Transaction;
    use chrono::Duration;
    use folio_model::NodeRegistry;
    use std::sync::Arc;

    fn edit(state: &EditorState, op: EditOp) -> EditorState {
        let mut tx = Transaction::begin(state);
        tx.apply(&op).unwrap();
        tx.commit().unwrap().state
    }

    fn setup() -> (EditorState, HistoryManager, DateTime<Utc>) {
        let initial = EditorState::empty(Arc::new(NodeRegistry::with_defaults())).unwrap();
        let history = HistoryManager::new(initial.clone(), &HistoryConfig::default());
        (initial, history, Utc::now())
    }

    fn typed(state: &EditorState, text: &str) -> EditorState {
        edit(state, EditOp::InsertText { text: text.into() })
    }

    #[test]
    fn test_typing_coalesces_into_one_step() {
        let (initial, mut history, t0) = setup();
        let tags = UpdateTags::merge("typing");

        let a = typed(&initial, "a");
        let ab = typed(&a, "b");
        let abc = typed(&ab, "c");
        assert_eq!(history.push_at(a, &tags, t0), HistoryAction::Pushed);
        assert_eq!(history.push_at(ab, &tags, t0 + Duration::milliseconds(100)), HistoryAction::Merged);
        assert_eq!(history.push_at(abc, &tags, t0 + Duration::milliseconds(200)), HistoryAction::Merged);

        assert_eq!(history.undo_len(), 1);
        let restored = history.undo().unwrap();
        assert_eq!(restored.text_content(), "");
        assert!(history.undo().is_none());
    }

    #[test]
    fn test_idle_window_splits_steps() {
        let (initial, mut history, t0) = setup();
        let tags = UpdateTags::merge("typing");

        let a = typed(&initial, "a");
        let ab = typed(&a, "b");
        history.push_at(a, &tags, t0);
        assert_eq!(history.push_at(ab, &tags, t0 + Duration::seconds(5)), HistoryAction::Pushed);

        assert_eq!(history.undo().unwrap().text_content(), "a");
    }

    #[test]
    fn test_boundary_and_untagged_commits_push() {
        let (initial, mut history, t0) = setup();
        let a = typed(&initial, "a");
        let ab = typed(&a, "b");
        let abc = typed(&ab, "c");

        history.push_at(a, &UpdateTags::merge("typing"), t0);
        assert_eq!(history.push_at(ab, &UpdateTags::boundary(), t0), HistoryAction::Pushed);
        assert_eq!(history.push_at(abc, &UpdateTags::default(), t0), HistoryAction::Pushed);
        assert_eq!(history.undo_len(), 3);
    }

    #[test]
    fn test_composition_coalesces_without_tag() {
        let (initial, mut history, t0) = setup();
        let k = typed(&initial, "k");
        let ka = typed(&k, "a");

        history.push_at(k, &UpdateTags::composing(), t0);
        assert_eq!(history.push_at(ka, &UpdateTags::composing(), t0 + Duration::seconds(10)), HistoryAction::Merged);
    }

    #[test]
    fn test_composition_after_typing_opens_new_step() {
        let (initial, mut history, t0) = setup();
        let mut composing = UpdateTags::merge("typing");
        composing.composing = true;

        let a = typed(&initial, "a");
        let ak = typed(&a, "k");
        let aka = typed(&ak, "a");
        history.push_at(a, &UpdateTags::merge("typing"), t0);
        assert_eq!(history.push_at(ak, &composing, t0), HistoryAction::Pushed);
        assert_eq!(history.push_at(aka, &composing, t0), HistoryAction::Merged);

        assert_eq!(history.undo().unwrap().text_content(), "a");
    }

    #[test]
    fn test_boundaries_do_not_split_a_composition() {
        let (initial, mut history, t0) = setup();
        let mut forced = UpdateTags::composing();
        forced.history_boundary = true;

        let k = typed(&initial, "k");
        let text = k.store().keys_in_order()[2];
        history.push_at(k.clone(), &UpdateTags::composing(), t0);
        assert_eq!(history.push_at(typed(&k, "a"), &forced, t0), HistoryAction::Merged);

        let ka = history.current().clone();
        let moved = edit(
            &ka,
            EditOp::SetSelection {
                selection: Selection::caret(Point::text(text, 0)),
            },
        );
        assert_eq!(history.push_at(moved.clone(), &UpdateTags::composing(), t0), HistoryAction::SelectionUpdated);
        assert_eq!(history.push_at(typed(&moved, "n"), &UpdateTags::composing(), t0), HistoryAction::Merged);

        assert_eq!(history.undo_len(), 1);
        assert_eq!(history.undo().unwrap().text_content(), "");
    }

    #[test]
    fn test_selection_change_closes_entry_and_is_restored() {
        let (initial, mut history, t0) = setup();
        let tags = UpdateTags::merge("typing");

        let hello = typed(&initial, "Hello");
        let text = hello.store().keys_in_order()[2];
        history.push_at(hello.clone(), &tags, t0);

        let selected = edit(
            &hello,
            EditOp::SetSelection {
                selection: Selection::range(Point::text(text, 0), Point::text(text, 5)),
            },
        );
        assert_eq!(history.push_at(selected.clone(), &tags, t0), HistoryAction::SelectionUpdated);

        let more = typed(&selected, "Bye");
        assert_eq!(history.push_at(more, &tags, t0), HistoryAction::Pushed);

        let restored = history.undo().unwrap();
        assert_eq!(restored.text_content(), "Hello");
        assert_eq!(restored.selection(), selected.selection());
    }

    #[test]
    fn test_redo_and_redo_invalidation() {
        let (initial, mut history, t0) = setup();
        let a = typed(&initial, "a");
        let ab = typed(&a, "b");
        history.push_at(a.clone(), &UpdateTags::default(), t0);
        history.push_at(ab, &UpdateTags::default(), t0);

        history.undo().unwrap();
        assert!(history.can_redo());
        assert_eq!(history.redo().unwrap().text_content(), "ab");
        assert!(history.redo().is_none());

        history.undo().unwrap();
        let ax = typed(&a, "x");
        history.push_at(ax, &UpdateTags::default(), t0);
        assert!(!history.can_redo());
    }

    #[test]
    fn test_max_levels_moves_initial_forward() {
        let (initial, _, t0) = setup();
        let mut history = HistoryManager::new(
            initial.clone(),
            &HistoryConfig {
                max_levels: 2,
                merge_window_ms: 0,
            },
        );

        let mut state = initial;
        for c in ["a", "b", "c"] {
            state = typed(&state, c);
            history.push_at(state.clone(), &UpdateTags::default(), t0);
        }

        assert_eq!(history.undo_len(), 2);
        history.undo().unwrap();
        assert_eq!(history.undo().unwrap().text_content(), "a");
        assert!(history.undo().is_none());
    }

    #[test]
    fn test_historic_commits_are_ignored() {
        let (initial, mut history, t0) = setup();
        let a = typed(&initial, "a");
        assert_eq!(history.push_at(a, &UpdateTags::historic(), t0), HistoryAction::Ignored);
        assert!(!history.can_undo());
    }
}
