//! Graph executor (v0.1)
//!
//! Walks a compiled graph strictly sequentially: one step at a time, each
//! attempt bounded by the step's declared timeout and retried per its
//! policy, with every attempt recorded in the trace. The executor owns the
//! live state for the whole run; steps only ever see a borrow, so the final
//! state is a deterministic function of graph, initial state, and step
//! outputs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use crate::error::{FailureClass, RunError, StepTimeout};
use crate::graph::CompiledGraph;
use crate::hook::{Hook, RunContext, StepEvent};
use crate::limits::RunLimits;
use crate::state::State;
use crate::step::StepPolicy;
use crate::trace::{ExecutionReport, Outcome, Trace, TraceEntry};

/// Sequential graph executor
///
/// Holds run-independent configuration (hooks, limits). Each `run` owns its
/// own state and trace, so one executor can drive concurrent runs of the
/// same compiled graph.
#[derive(Default)]
pub struct Executor {
    hooks: Vec<Arc<dyn Hook>>,
    limits: RunLimits,
}

/// A failed attempt, before classification
struct Failure {
    error: anyhow::Error,
    timed_out: bool,
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a telemetry hook (called in attachment order)
    pub fn with_hook(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Apply run-level ceilings (step budget, deadline)
    pub fn with_limits(mut self, limits: RunLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Execute the graph from its entry step
    ///
    /// Never fails at the signature level: step failures, timeouts, and
    /// exhausted budgets all land in the report's `terminal_error`, together
    /// with whatever state merged before the failure.
    #[instrument(skip(self, graph, initial), fields(entry = %graph.entry()))]
    pub async fn run(&self, graph: &CompiledGraph, initial: State) -> ExecutionReport {
        let ctx = RunContext::new();
        let mut state = initial;
        let mut trace = Trace::new();
        let mut attempts_total: u64 = 0;
        let mut current = graph.entry_arc();

        debug!(run_id = ctx.run_id(), entry = %current, "starting run");

        loop {
            // Compile-time validation guarantees every reachable id resolves
            let entry = graph
                .step(&current)
                .expect("compiled graph resolves every reachable step id");
            let policy = entry.policy;

            let mut attempt: u32 = 1;
            let delta = loop {
                if let Some(terminal) = self.budget_exceeded(&ctx, attempts_total) {
                    warn!(run_id = ctx.run_id(), step = %current, error = %terminal, "run budget exhausted");
                    return ExecutionReport {
                        final_state: state,
                        trace,
                        terminal_error: Some(terminal),
                    };
                }
                attempts_total += 1;

                let state_keys = state.key_snapshot();
                let pre = StepEvent {
                    step_id: Arc::clone(&current),
                    attempt,
                    state_keys: state_keys.clone(),
                    elapsed: Duration::ZERO,
                    outcome: None,
                };
                for hook in &self.hooks {
                    hook.before_step(&ctx, &pre);
                }

                debug!(run_id = ctx.run_id(), step = %current, attempt, "invoking step");
                let started_ms = ctx.elapsed_ms();
                let attempt_started = Instant::now();
                let invocation =
                    tokio::time::timeout(policy.timeout, entry.step.execute(&state)).await;
                let elapsed = attempt_started.elapsed();
                let ended_ms = ctx.elapsed_ms();

                let failure = match invocation {
                    Ok(Ok(delta)) => {
                        trace.record(TraceEntry {
                            step_id: Arc::clone(&current),
                            attempt,
                            started_ms,
                            ended_ms,
                            outcome: Outcome::Success,
                            error: None,
                        });
                        self.emit_after(&ctx, &current, attempt, state_keys, elapsed, Outcome::Success);
                        break delta;
                    }
                    Ok(Err(error)) => Failure {
                        error,
                        timed_out: false,
                    },
                    // Expiry abandons the attempt; an in-flight side effect may
                    // have happened, but its result is discarded, never merged.
                    Err(_expired) => Failure {
                        error: anyhow::Error::new(StepTimeout {
                            step_id: Arc::clone(&current),
                            timeout: policy.timeout,
                        }),
                        timed_out: true,
                    },
                };

                let class = entry.step.classify(&failure.error);
                let transient = class == FailureClass::Transient;

                if transient && attempt <= policy.max_retries {
                    debug!(
                        run_id = ctx.run_id(),
                        step = %current,
                        attempt,
                        error = %failure.error,
                        "transient failure, retrying"
                    );
                    trace.record(TraceEntry {
                        step_id: Arc::clone(&current),
                        attempt,
                        started_ms,
                        ended_ms,
                        outcome: Outcome::Retry,
                        error: Some(failure.error.to_string()),
                    });
                    self.emit_after(&ctx, &current, attempt, state_keys, elapsed, Outcome::Retry);
                    // Retries re-invoke against the same pre-attempt state:
                    // nothing was merged from the failed attempt.
                    attempt += 1;
                    continue;
                }

                warn!(
                    run_id = ctx.run_id(),
                    step = %current,
                    attempt,
                    error = %failure.error,
                    "step failed, terminating run"
                );
                trace.record(TraceEntry {
                    step_id: Arc::clone(&current),
                    attempt,
                    started_ms,
                    ended_ms,
                    outcome: Outcome::Fatal,
                    error: Some(failure.error.to_string()),
                });
                self.emit_after(&ctx, &current, attempt, state_keys, elapsed, Outcome::Fatal);

                return ExecutionReport {
                    final_state: state,
                    trace,
                    terminal_error: Some(terminal_error(
                        &current, attempt, policy, failure, transient,
                    )),
                };
            };

            state.merge(delta);

            match graph.next_step(&current, &state) {
                Some(next) => {
                    debug!(run_id = ctx.run_id(), from = %current, to = %next, "transition");
                    current = next;
                }
                None => {
                    debug!(run_id = ctx.run_id(), last = %current, "terminal step reached");
                    return ExecutionReport {
                        final_state: state,
                        trace,
                        terminal_error: None,
                    };
                }
            }
        }
    }

    fn budget_exceeded(&self, ctx: &RunContext, attempts_total: u64) -> Option<RunError> {
        if let Some(max_steps) = self.limits.max_steps {
            if attempts_total >= max_steps {
                return Some(RunError::StepBudgetExhausted { max_steps });
            }
        }
        if let Some(deadline) = self.limits.max_run_duration {
            if ctx.elapsed() >= deadline {
                return Some(RunError::DeadlineExceeded { deadline });
            }
        }
        None
    }

    fn emit_after(
        &self,
        ctx: &RunContext,
        step_id: &Arc<str>,
        attempt: u32,
        state_keys: Vec<String>,
        elapsed: Duration,
        outcome: Outcome,
    ) {
        if self.hooks.is_empty() {
            return;
        }
        let event = StepEvent {
            step_id: Arc::clone(step_id),
            attempt,
            state_keys,
            elapsed,
            outcome: Some(outcome),
        };
        for hook in &self.hooks {
            hook.after_step(ctx, &event);
        }
    }
}

/// Build the terminal error for the last failed attempt
///
/// A transient failure that had a retry budget surfaces as
/// MaxRetriesExceeded; with no budget (or a fatal classification) the
/// failure surfaces directly as Timeout or StepFailed.
fn terminal_error(
    step_id: &Arc<str>,
    attempt: u32,
    policy: StepPolicy,
    failure: Failure,
    transient: bool,
) -> RunError {
    if transient && policy.max_retries > 0 {
        RunError::MaxRetriesExceeded {
            step_id: Arc::clone(step_id),
            attempts: attempt,
            cause: failure.error,
        }
    } else if failure.timed_out {
        RunError::Timeout {
            step_id: Arc::clone(step_id),
            attempt,
            timeout: policy.timeout,
        }
    } else {
        RunError::StepFailed {
            step_id: Arc::clone(step_id),
            attempt,
            cause: failure.error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RunErrorKind;
    use crate::graph::GraphBuilder;
    use crate::state::StateDelta;
    use crate::step::FnStep;
    use anyhow::anyhow;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn delta_of(key: &str, value: serde_json::Value) -> StateDelta {
        let mut delta = StateDelta::new();
        delta.insert(key, value);
        delta
    }

    #[tokio::test]
    async fn linear_run_merges_and_traces() {
        let graph = GraphBuilder::new()
            .add_step(
                "fetch",
                FnStep::new(|_state: State| async move {
                    Ok(delta_of("raw", json!("<html>hello</html>")))
                }),
                StepPolicy::default(),
            )
            .add_step(
                "parse",
                FnStep::new(|state: State| async move {
                    assert!(state.contains_key("raw"));
                    Ok(delta_of("text", json!("hello")))
                }),
                StepPolicy::default(),
            )
            .add_edge("fetch", "parse")
            .set_entry("fetch")
            .compile()
            .unwrap();

        let report = Executor::new().run(&graph, State::new()).await;

        assert!(report.is_success());
        assert_eq!(report.final_state.get("raw"), Some(&json!("<html>hello</html>")));
        assert_eq!(report.final_state.get("text"), Some(&json!("hello")));
        assert_eq!(report.trace.len(), 2);
        assert_eq!(report.trace.entries()[0].step_id.as_ref(), "fetch");
        assert!(report
            .trace
            .entries()
            .iter()
            .all(|e| e.outcome == Outcome::Success));
    }

    #[tokio::test]
    async fn transient_failures_retry_then_succeed() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_step = Arc::clone(&calls);
        let graph = GraphBuilder::new()
            .add_step(
                "flaky",
                FnStep::new(move |_state: State| {
                    let calls = Arc::clone(&calls_step);
                    async move {
                        if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                            Err(anyhow!("connection reset"))
                        } else {
                            Ok(delta_of("ok", json!(true)))
                        }
                    }
                }),
                StepPolicy::default().with_max_retries(3),
            )
            .set_entry("flaky")
            .compile()
            .unwrap();

        let report = Executor::new().run(&graph, State::new()).await;

        assert!(report.is_success());
        assert_eq!(report.final_state.get("ok"), Some(&json!(true)));
        assert_eq!(report.trace.attempts("flaky"), 3);
        let outcomes: Vec<Outcome> = report.trace.entries().iter().map(|e| e.outcome).collect();
        assert_eq!(outcomes, vec![Outcome::Retry, Outcome::Retry, Outcome::Success]);
    }

    #[tokio::test]
    async fn fatal_failure_stops_run_and_keeps_merged_state() {
        let graph = GraphBuilder::new()
            .add_step(
                "fetch",
                FnStep::new(|_state: State| async move { Ok(delta_of("raw", json!("data"))) }),
                StepPolicy::default(),
            )
            .add_step(
                "parse",
                FnStep::new(|_state: State| async move { Err(anyhow!("malformed input")) })
                    .with_classifier(|_err| FailureClass::Fatal),
                StepPolicy::default().with_max_retries(5),
            )
            .add_edge("fetch", "parse")
            .set_entry("fetch")
            .compile()
            .unwrap();

        let report = Executor::new().run(&graph, State::new()).await;

        let terminal = report.terminal_error.unwrap();
        assert_eq!(terminal.kind(), RunErrorKind::StepFailed);
        assert_eq!(terminal.step_id(), Some("parse"));
        assert_eq!(terminal.attempts(), Some(1));
        // fetch's output survives the fatal parse
        assert_eq!(report.final_state.get("raw"), Some(&json!("data")));
        assert_eq!(report.trace.attempts("parse"), 1);
    }

    #[tokio::test]
    async fn timeout_with_no_retries_is_a_timeout_terminal() {
        let graph = GraphBuilder::new()
            .add_step(
                "slow",
                FnStep::new(|_state: State| async move {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(StateDelta::new())
                }),
                StepPolicy::new(Duration::from_millis(10), 0),
            )
            .set_entry("slow")
            .compile()
            .unwrap();

        let report = Executor::new().run(&graph, State::new()).await;

        let terminal = report.terminal_error.unwrap();
        assert_eq!(terminal.kind(), RunErrorKind::Timeout);
        assert!(report.final_state.is_empty());
        assert_eq!(report.trace.len(), 1);
        assert_eq!(report.trace.entries()[0].outcome, Outcome::Fatal);
    }

    #[tokio::test]
    async fn timeout_is_retried_by_default() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_step = Arc::clone(&calls);
        let graph = GraphBuilder::new()
            .add_step(
                "slow_once",
                FnStep::new(move |_state: State| {
                    let calls = Arc::clone(&calls_step);
                    async move {
                        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                            tokio::time::sleep(Duration::from_secs(60)).await;
                        }
                        Ok(delta_of("ok", json!(true)))
                    }
                }),
                StepPolicy::new(Duration::from_millis(20), 1),
            )
            .set_entry("slow_once")
            .compile()
            .unwrap();

        let report = Executor::new().run(&graph, State::new()).await;

        assert!(report.is_success());
        assert_eq!(report.trace.attempts("slow_once"), 2);
        assert_eq!(report.trace.entries()[0].outcome, Outcome::Retry);
    }

    #[tokio::test]
    async fn step_budget_bounds_cyclic_graphs() {
        let graph = GraphBuilder::new()
            .add_step(
                "spin",
                FnStep::new(|_state: State| async move { Ok(StateDelta::new()) }),
                StepPolicy::default(),
            )
            .add_edge("spin", "spin")
            .set_entry("spin")
            .compile()
            .unwrap();

        let executor = Executor::new().with_limits(RunLimits::unbounded().with_max_steps(7));
        let report = executor.run(&graph, State::new()).await;

        let terminal = report.terminal_error.unwrap();
        assert_eq!(terminal.kind(), RunErrorKind::StepBudgetExhausted);
        assert_eq!(report.trace.len(), 7);
    }

    #[tokio::test]
    async fn hooks_see_every_attempt() {
        #[derive(Default)]
        struct Recording {
            before: AtomicU32,
            after: AtomicU32,
        }
        impl Hook for Recording {
            fn before_step(&self, _ctx: &RunContext, event: &StepEvent) {
                assert!(event.outcome.is_none());
                self.before.fetch_add(1, Ordering::SeqCst);
            }
            fn after_step(&self, _ctx: &RunContext, event: &StepEvent) {
                assert!(event.outcome.is_some());
                self.after.fetch_add(1, Ordering::SeqCst);
            }
        }

        let hook = Arc::new(Recording::default());
        let graph = GraphBuilder::new()
            .add_step(
                "fetch",
                FnStep::new(|_state: State| async move { Ok(delta_of("raw", json!("x"))) }),
                StepPolicy::default(),
            )
            .add_step(
                "parse",
                FnStep::new(|_state: State| async move { Ok(delta_of("text", json!("y"))) }),
                StepPolicy::default(),
            )
            .add_edge("fetch", "parse")
            .set_entry("fetch")
            .compile()
            .unwrap();

        let recording: Arc<dyn Hook> = Arc::clone(&hook) as Arc<dyn Hook>;
        let executor = Executor::new().with_hook(recording);
        let report = executor.run(&graph, State::new()).await;

        assert!(report.is_success());
        assert_eq!(hook.before.load(Ordering::SeqCst), 2);
        assert_eq!(hook.after.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_runs_share_one_graph() {
        let graph = Arc::new(
            GraphBuilder::new()
                .add_step(
                    "echo",
                    FnStep::new(|state: State| async move {
                        let mut delta = StateDelta::new();
                        delta.insert("echo", state.get("input").cloned().unwrap_or_default());
                        Ok(delta)
                    }),
                    StepPolicy::default(),
                )
                .set_entry("echo")
                .compile()
                .unwrap(),
        );

        let mut handles = Vec::new();
        for i in 0..4 {
            let graph = Arc::clone(&graph);
            handles.push(tokio::spawn(async move {
                let mut initial = State::new();
                initial.insert("input", json!(i));
                Executor::new().run(&graph, initial).await
            }));
        }

        for (i, handle) in handles.into_iter().enumerate() {
            let report = handle.await.unwrap();
            assert_eq!(report.final_state.get("echo"), Some(&json!(i)));
        }
    }
}
