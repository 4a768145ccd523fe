//! Trellis - graph execution engine for structured data extraction pipelines

pub mod config;
pub mod error;
pub mod executor;
pub mod graph;
pub mod hook;
pub mod limits;
pub mod state;
pub mod step;
pub mod trace;

pub use config::PolicyTable;
pub use error::{
    ConfigError, FailureClass, FixSuggestion, RunError, RunErrorKind, StepTimeout, ValidationError,
};
pub use executor::Executor;
pub use graph::{CompiledGraph, GraphBuilder, Predicate};
pub use hook::{Hook, RunContext, StepEvent};
pub use limits::RunLimits;
pub use state::{State, StateDelta};
pub use step::{FnStep, Step, StepPolicy, DEFAULT_STEP_TIMEOUT};
pub use trace::{ExecutionReport, Outcome, Trace, TraceEntry};
