use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

/// Stable node identity.
///
/// Keys are allocated from a process-wide counter and are never handed out
/// twice, so a key that disappears from a store stays dead forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeKey(u64);

impl NodeKey {
    /// Allocate the next unused key
    pub fn next() -> Self {
        Self(NEXT_KEY.fetch_add(1, Ordering::Relaxed))
    }

    /// Rebuild a key from its raw value (interchange, tests)
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    /// Advance the allocator past `key` so imported keys are never reissued
    pub fn reserve(key: NodeKey) {
        NEXT_KEY.fetch_max(key.0.saturating_add(1), Ordering::Relaxed);
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
