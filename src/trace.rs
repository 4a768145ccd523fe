//! Execution trace and run report (v0.1)
//!
//! Append-only record of every step attempt, with timestamps relative to
//! run start. The trace grows only while the run is in flight and is
//! immutable once the report is returned to the caller.
//!
//! Uses Arc<str> for step_id fields to enable zero-cost cloning.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RunError;
use crate::state::State;

/// Outcome of a single step attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The attempt returned a delta that was merged
    Success,
    /// The attempt failed transient with retry budget remaining
    Retry,
    /// The attempt ended the run
    Fatal,
}

/// One attempt of one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub step_id: Arc<str>,
    /// 1-based attempt number at this step
    pub attempt: u32,
    /// Time since run start when the attempt began (ms)
    pub started_ms: u64,
    /// Time since run start when the attempt finished (ms)
    pub ended_ms: u64,
    pub outcome: Outcome,
    /// Failure message for retry/fatal attempts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Ordered record of attempts for one run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trace {
    entries: Vec<TraceEntry>,
}

impl Trace {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, entry: TraceEntry) {
        self.entries.push(entry);
    }

    /// All entries, in the exact order attempts occurred
    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    /// Entries for one step
    pub fn for_step(&self, step_id: &str) -> Vec<&TraceEntry> {
        self.entries
            .iter()
            .filter(|e| e.step_id.as_ref() == step_id)
            .collect()
    }

    /// Attempts recorded for one step
    pub fn attempts(&self, step_id: &str) -> u32 {
        self.for_step(step_id).len() as u32
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize to JSON for persistence/debugging
    pub fn to_json(&self) -> Value {
        serde_json::to_value(&self.entries).unwrap_or(Value::Null)
    }
}

/// Result of one `run()` call, owned by the caller
///
/// Always populated: a failed run carries whatever state merged before the
/// failure plus the terminal error, never a silent empty success.
#[derive(Debug)]
pub struct ExecutionReport {
    pub final_state: State,
    pub trace: Trace,
    pub terminal_error: Option<RunError>,
}

impl ExecutionReport {
    /// Check whether the run reached a terminal step without error
    pub fn is_success(&self) -> bool {
        self.terminal_error.is_none()
    }
}
