//! Scheduler Configuration
//!
//! Hosts can tune the flush loop from a JSON document; any field left out
//! falls back to its default.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default bound on fixed-point flush rounds.
pub const DEFAULT_MAX_FLUSH_ROUNDS: usize = 1000;

/// Tunables for a [`Scheduler`](crate::reactive::Scheduler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// Upper bound on rounds per flush. A listener that keeps dirtying
    /// itself is cut off here and its remaining work waits for the next
    /// flush.
    pub max_flush_rounds: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_flush_rounds: DEFAULT_MAX_FLUSH_ROUNDS,
        }
    }
}

impl SchedulerConfig {
    /// Parse a config from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
