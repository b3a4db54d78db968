//! # Update Requests
//!
//! External triggers (input events, programmatic calls, timers) become
//! [`UpdateRequest`]s waiting in an [`UpdateQueue`]. The editor drains the
//! queue one request at a time, running each to commit before the next.

use crate::commands::EditOp;
use crate::errors::EditorResult;
use crate::transaction::Transaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// How a commit should be treated by history
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTags {
    /// Consecutive commits sharing a tag within the merge window coalesce
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_tag: Option<String>,

    /// Force this commit to open a new history entry
    #[serde(default)]
    pub history_boundary: bool,

    /// Part of an IME composition session
    #[serde(default)]
    pub composing: bool,

    /// Commit without recording history
    #[serde(default)]
    pub skip_history: bool,

    /// Undo/redo replay
    #[serde(skip)]
    pub(crate) historic: bool,
}

impl UpdateTags {
    pub fn merge(tag: impl Into<String>) -> Self {
        Self {
            merge_tag: Some(tag.into()),
            ..Self::default()
        }
    }

    pub fn boundary() -> Self {
        Self {
            history_boundary: true,
            ..Self::default()
        }
    }

    pub fn composing() -> Self {
        Self {
            composing: true,
            ..Self::default()
        }
    }

    pub fn skip_history() -> Self {
        Self {
            skip_history: true,
            ..Self::default()
        }
    }

    pub fn is_historic(&self) -> bool {
        self.historic
    }

    pub(crate) fn historic() -> Self {
        Self {
            historic: true,
            ..Self::default()
        }
    }

    /// Tags of a coalesced batch: the last request decides the merge tag,
    /// the flags accumulate
    pub(crate) fn absorb(&mut self, other: &UpdateTags) {
        if other.merge_tag.is_some() {
            self.merge_tag = other.merge_tag.clone();
        }
        self.history_boundary |= other.history_boundary;
        self.composing = other.composing;
        self.skip_history |= other.skip_history;
    }
}

pub type UpdateFn = Box<dyn FnOnce(&mut Transaction) -> EditorResult<()>>;

pub enum UpdateBody {
    Ops(Vec<EditOp>),
    Callback(UpdateFn),
}

impl fmt::Debug for UpdateBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateBody::Ops(ops) => f.debug_tuple("Ops").field(ops).finish(),
            UpdateBody::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

#[derive(Debug)]
pub struct UpdateRequest {
    pub body: UpdateBody,
    pub tags: UpdateTags,
}

impl UpdateRequest {
    pub fn ops(ops: Vec<EditOp>) -> Self {
        Self {
            body: UpdateBody::Ops(ops),
            tags: UpdateTags::default(),
        }
    }

    pub fn op(op: EditOp) -> Self {
        Self::ops(vec![op])
    }

    pub fn callback(f: impl FnOnce(&mut Transaction) -> EditorResult<()> + 'static) -> Self {
        Self {
            body: UpdateBody::Callback(Box::new(f)),
            tags: UpdateTags::default(),
        }
    }

    pub fn with_tags(mut self, tags: UpdateTags) -> Self {
        self.tags = tags;
        self
    }

    /// Run the request's body against `tx`
    pub fn run(self, tx: &mut Transaction) -> EditorResult<()> {
        match self.body {
            UpdateBody::Ops(ops) => {
                for op in &ops {
                    tx.apply(op)?;
                }
                Ok(())
            }
            UpdateBody::Callback(f) => tx.run(f),
        }
    }
}

/// Request waiting for its turn
#[derive(Debug)]
pub struct PendingUpdate {
    /// Sequence number within the queue's lifetime
    pub id: u64,

    pub request: UpdateRequest,

    /// When it was queued
    pub enqueued_at: DateTime<Utc>,
}

/// FIFO of update requests
#[derive(Debug, Default)]
pub struct UpdateQueue {
    pending: VecDeque<PendingUpdate>,
    next_id: u64,
}

impl UpdateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a request; returns its id
    pub fn push(&mut self, request: UpdateRequest) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.push_back(PendingUpdate {
            id,
            request,
            enqueued_at: Utc::now(),
        });
        id
    }

    pub fn pop(&mut self) -> Option<PendingUpdate> {
        self.pending.pop_front()
    }

    /// Move every request of `other` to the back of this queue
    pub fn append(&mut self, other: &mut UpdateQueue) {
        while let Some(pending) = other.pop() {
            self.push(pending.request);
        }
    }

    /// Put requests that were taken but never ran back at the front,
    /// keeping their order and ids
    pub fn requeue(&mut self, pending: Vec<PendingUpdate>) {
        for update in pending.into_iter().rev() {
            self.pending.push_front(update);
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop a request that has not run yet
    pub fn cancel(&mut self, id: u64) -> bool {
        let before = self.pending.len();
        self.pending.retain(|p| p.id != id);
        before != self.pending.len()
    }
}
