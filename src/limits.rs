//! Run-level safety limits (v0.1)
//!
//! The engine imposes no step ceiling of its own: cyclic graphs are legal
//! and expected to be bounded by state-derived loop predicates. RunLimits
//! is the opt-in safety net for runs where an accidental infinite loop
//! would be expensive (model calls, paid fetches).

use std::time::Duration;

/// Optional ceilings applied to a whole run
///
/// Both limits default to unbounded. The executor checks them before each
/// attempt and terminates the run with a structured error when one is
/// exceeded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunLimits {
    /// Maximum step attempts for the whole run (None = unbounded)
    pub max_steps: Option<u64>,
    /// Maximum wall-clock duration for the whole run (None = unbounded)
    pub max_run_duration: Option<Duration>,
}

impl RunLimits {
    /// No ceilings at all (the default)
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Limits suitable for tests (tight ceilings)
    pub fn testing() -> Self {
        Self {
            max_steps: Some(100),
            max_run_duration: Some(Duration::from_secs(60)),
        }
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn with_max_run_duration(mut self, max_run_duration: Duration) -> Self {
        self.max_run_duration = Some(max_run_duration);
        self
    }
}
