//! Editor configuration
//!
//! Loaded from the `editor` section of `folio.config.json` by the CLI, or
//! built in code.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorConfig {
    #[serde(default)]
    pub history: HistoryConfig,

    /// Commit all deferred requests as one transaction on flush
    #[serde(default)]
    pub coalesce_deferred: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryConfig {
    /// Undo levels kept (0 = unlimited)
    #[serde(default = "default_max_levels")]
    pub max_levels: usize,

    /// Idle time after which a merge tag stops coalescing
    #[serde(default = "default_merge_window_ms")]
    pub merge_window_ms: u64,
}

fn default_max_levels() -> usize {
    100
}

fn default_merge_window_ms() -> u64 {
    1000
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            history: HistoryConfig::default(),
            coalesce_deferred: false,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_levels: default_max_levels(),
            merge_window_ms: default_merge_window_ms(),
        }
    }
}
