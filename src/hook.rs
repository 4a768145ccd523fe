//! Observability hooks and per-run context (v0.1)
//!
//! Hooks are the engine's only telemetry surface: a sink receives pre- and
//! post-attempt callbacks and decides what to do with them. The engine
//! assumes nothing about the sink beyond the calls returning.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::trace::Outcome;

/// Context scoped to a single run, threaded through hook callbacks
///
/// Replaces process-wide telemetry globals: the id and clock live exactly
/// as long as the run that owns them.
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: u64,
    started: Instant,
}

impl RunContext {
    pub(crate) fn new() -> Self {
        static NEXT_RUN_ID: AtomicU64 = AtomicU64::new(0);
        Self {
            run_id: NEXT_RUN_ID.fetch_add(1, Ordering::Relaxed),
            started: Instant::now(),
        }
    }

    /// Process-unique id of this run
    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Time elapsed since the run started
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub(crate) fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Payload for a hook callback
#[derive(Debug, Clone)]
pub struct StepEvent {
    pub step_id: Arc<str>,
    /// 1-based attempt number
    pub attempt: u32,
    /// Keys present in the state snapshot handed to the step
    pub state_keys: Vec<String>,
    /// Wall-clock duration of the attempt (zero in the pre-step callback)
    pub elapsed: Duration,
    /// Attempt outcome (None in the pre-step callback)
    pub outcome: Option<Outcome>,
}

/// Pre/post-step callback surface for external telemetry
///
/// Both methods default to no-ops so sinks implement only what they need.
/// Callbacks run synchronously on the executor's walk; a sink that must not
/// block hands the event off to its own channel.
pub trait Hook: Send + Sync {
    fn before_step(&self, _ctx: &RunContext, _event: &StepEvent) {}
    fn after_step(&self, _ctx: &RunContext, _event: &StepEvent) {}
}
