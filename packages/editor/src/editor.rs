//! # Editor
//!
//! Owns the current [`EditorState`] and drives the update cycle:
//!
//! ```text
//! enqueue ──▶ UpdateQueue ──▶ Transaction ──▶ commit ──▶ diff ──▶ history
//!                  ▲                                               │
//!                  └──────── deferred requests / listeners ◀───────┘
//! ```
//!
//! Requests run one at a time, each to commit, before the next is popped.
//! Requests raised while draining (from callbacks via
//! [`Transaction::queue_update`] or from listeners) join the back of the
//! queue and never run nested.

use crate::config::EditorConfig;
use crate::errors::{EditorError, EditorResult};
use crate::history::{HistoryAction, HistoryManager};
use crate::mutations::Mutation;
use crate::queue::{PendingUpdate, UpdateQueue, UpdateRequest, UpdateTags};
use crate::reconciler::diff;
use crate::state::EditorState;
use crate::transaction::{Committed, Transaction};
use folio_model::NodeRegistry;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Everything a view layer needs to mirror one commit
#[derive(Debug, Clone)]
pub struct CommitEvent {
    pub prev: EditorState,
    pub next: EditorState,
    pub mutations: Vec<Mutation>,
    pub selection_changed: bool,
    pub tags: UpdateTags,
}

/// Observer notified once per commit.
///
/// Listeners see immutable snapshots; follow-up edits go through `queue`
/// and run after the current commit has been fully delivered.
pub trait CommitListener {
    fn on_commit(&mut self, event: &CommitEvent, queue: &mut UpdateQueue);
}

impl<F> CommitListener for F
where
    F: FnMut(&CommitEvent, &mut UpdateQueue),
{
    fn on_commit(&mut self, event: &CommitEvent, queue: &mut UpdateQueue) {
        self(event, queue)
    }
}

/// Summary of one commit
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub version: u64,
    pub mutations: Vec<Mutation>,
    pub selection_changed: bool,
    /// Operations rolled back as no-ops
    pub skipped: usize,
    pub history: HistoryAction,
}

pub struct Editor {
    state: EditorState,
    history: HistoryManager,
    queue: UpdateQueue,
    listeners: Vec<Box<dyn CommitListener>>,
    config: EditorConfig,
}

impl fmt::Debug for Editor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Editor")
            .field("version", &self.state.version())
            .field("pending", &self.queue.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Editor {
    /// Editor over an empty document
    pub fn new(registry: Arc<NodeRegistry>, config: EditorConfig) -> EditorResult<Self> {
        Ok(Self::with_state(EditorState::empty(registry)?, config))
    }

    pub fn with_state(state: EditorState, config: EditorConfig) -> Self {
        Self {
            history: HistoryManager::new(state.clone(), &config.history),
            state,
            queue: UpdateQueue::new(),
            listeners: Vec::new(),
            config,
        }
    }

    /// Resume an existing undo history; the editor starts at the snapshot
    /// the history currently sits at
    pub fn with_history(history: HistoryManager, config: EditorConfig) -> Self {
        let state = history.current().clone();
        info!(version = state.version(), levels = history.undo_len(), "editor resumed from history");
        Self {
            history,
            state,
            queue: UpdateQueue::new(),
            listeners: Vec::new(),
            config,
        }
    }

    /// Hand the undo history over, to be resumed with [`Editor::with_history`]
    pub fn into_history(self) -> HistoryManager {
        self.history
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn register_listener(&mut self, listener: impl CommitListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Queue a request without running it; returns its queue id
    pub fn enqueue(&mut self, request: UpdateRequest) -> u64 {
        self.queue.push(request)
    }

    /// Drop a queued request that has not run yet
    pub fn cancel(&mut self, id: u64) -> bool {
        self.queue.cancel(id)
    }

    /// Queue `request` and drain the queue
    pub fn update(&mut self, request: UpdateRequest) -> EditorResult<Vec<CommitOutcome>> {
        self.queue.push(request);
        self.flush()
    }

    /// Run every queued request to commit.
    ///
    /// Stops at the first aborted transaction. The request that broke it
    /// is dropped; requests after it, including those coalesced into the
    /// same batch, stay queued.
    pub fn flush(&mut self) -> EditorResult<Vec<CommitOutcome>> {
        let mut outcomes = Vec::new();
        while !self.queue.is_empty() {
            let mut batch = Vec::new();
            if self.config.coalesce_deferred {
                while let Some(pending) = self.queue.pop() {
                    batch.push(pending);
                }
            } else if let Some(pending) = self.queue.pop() {
                batch.push(pending);
            }
            outcomes.push(self.run_batch(batch)?);
        }
        Ok(outcomes)
    }

    fn run_batch(&mut self, batch: Vec<PendingUpdate>) -> EditorResult<CommitOutcome> {
        let mut tags = UpdateTags::default();
        for pending in &batch {
            tags.absorb(&pending.request.tags);
        }

        let mut tx = Transaction::begin(&self.state).with_tags(tags);
        let mut batch = batch.into_iter();
        while let Some(pending) = batch.next() {
            let id = pending.id;
            if pending.request.run(&mut tx).is_err() {
                let rest: Vec<PendingUpdate> = batch.collect();
                debug!(id, requeued = rest.len(), "request aborted its batch");
                self.queue.requeue(rest);
                break;
            }
        }
        let committed = tx.commit()?;
        self.publish(committed)
    }

    /// Step back in history, as a new forward commit
    pub fn undo(&mut self) -> EditorResult<Option<CommitOutcome>> {
        match self.history.undo() {
            Some(snapshot) => self.restore(snapshot).map(Some),
            None => Ok(None),
        }
    }

    /// Re-apply the last undone step, as a new forward commit
    pub fn redo(&mut self) -> EditorResult<Option<CommitOutcome>> {
        match self.history.redo() {
            Some(snapshot) => self.restore(snapshot).map(Some),
            None => Ok(None),
        }
    }

    fn restore(&mut self, snapshot: EditorState) -> EditorResult<CommitOutcome> {
        let state = EditorState::from_parts(
            self.state.version() + 1,
            snapshot.store().clone(),
            snapshot.selection().clone(),
        );
        self.publish(Committed {
            state,
            tags: UpdateTags::historic(),
            deferred: Vec::new(),
            skipped: 0,
        })
    }

    /// Replace the document wholesale; history starts over
    pub fn set_state(&mut self, state: EditorState) {
        info!(version = state.version(), "editor state replaced");
        self.history.reset(state.clone());
        self.state = state;
    }

    /// Install a committed state: diff, record, notify
    fn publish(&mut self, committed: Committed) -> EditorResult<CommitOutcome> {
        let Committed {
            state: next,
            tags,
            deferred,
            skipped,
        } = committed;

        let mutations = diff(&self.state, &next).map_err(|e| EditorError::invalid_structure(e.to_string()))?;
        let prev = std::mem::replace(&mut self.state, next.clone());
        let history = self.history.push(next.clone(), &tags);
        for request in deferred {
            self.queue.push(request);
        }

        let event = CommitEvent {
            selection_changed: prev.selection() != next.selection(),
            prev,
            next,
            mutations,
            tags,
        };
        for listener in self.listeners.iter_mut() {
            listener.on_commit(&event, &mut self.queue);
        }

        debug!(
            version = event.next.version(),
            mutations = event.mutations.len(),
            ?history,
            "commit published"
        );
        Ok(CommitOutcome {
            version: event.next.version(),
            selection_changed: event.selection_changed,
            mutations: event.mutations,
            skipped,
            history,
        })
    }
}
