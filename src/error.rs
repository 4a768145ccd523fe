//! Error types with fix suggestions (v0.1)

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// Classification of a step failure, controls whether the executor retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Retryable failure (e.g. a transient network error)
    Transient,
    /// Non-retryable failure, aborts the run immediately
    Fatal,
}

/// Malformed graph declaration, raised at `compile()` and never at run time
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no entry step declared")]
    MissingEntry,

    #[error("entry step '{0}' is not registered")]
    UnknownEntry(String),

    #[error("entry step declared twice ('{first}', then '{second}')")]
    DuplicateEntry { first: String, second: String },

    #[error("step id '{0}' registered twice")]
    DuplicateStep(String),

    #[error("edge '{from}' -> '{to}' references an unregistered step")]
    DanglingEdge { from: String, to: String },

    #[error("step '{step_id}' declares conflicting default successors ('{first}', then '{second}')")]
    ConflictingDefault {
        step_id: String,
        first: String,
        second: String,
    },
}

impl FixSuggestion for ValidationError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            ValidationError::MissingEntry => Some("Call set_entry with the id of the first step"),
            ValidationError::UnknownEntry(_) => Some("Register the entry step with add_step before compiling"),
            ValidationError::DuplicateEntry { .. } => Some("Declare exactly one entry step per graph"),
            ValidationError::DuplicateStep(_) => Some("Use unique step ids within one graph"),
            ValidationError::DanglingEdge { .. } => {
                Some("Register both edge endpoints with add_step before compiling")
            }
            ValidationError::ConflictingDefault { .. } => {
                Some("Route a step's no-match case to a single target; use add_branch for extra predicates")
            }
        }
    }
}

/// Synthesized when a step attempt exceeds its declared timeout
///
/// Handed to the step's classifier like any raised failure, so a classifier
/// can downcast and override the transient-by-default treatment.
#[derive(Debug, Error)]
#[error("step '{step_id}' timed out after {timeout:?}")]
pub struct StepTimeout {
    pub step_id: Arc<str>,
    pub timeout: Duration,
}

/// Terminal failure of a run, carried in the execution report
///
/// Never unwinds out of `run()`; callers inspect the report's
/// `terminal_error` instead of relying on control flow.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("step '{step_id}' timed out after {timeout:?} on attempt {attempt}")]
    Timeout {
        step_id: Arc<str>,
        attempt: u32,
        timeout: Duration,
    },

    #[error("step '{step_id}' failed on attempt {attempt}: {cause}")]
    StepFailed {
        step_id: Arc<str>,
        attempt: u32,
        cause: anyhow::Error,
    },

    #[error("step '{step_id}' exhausted its retries after {attempts} attempts: {cause}")]
    MaxRetriesExceeded {
        step_id: Arc<str>,
        attempts: u32,
        cause: anyhow::Error,
    },

    #[error("run exceeded its step budget of {max_steps} attempts")]
    StepBudgetExhausted { max_steps: u64 },

    #[error("run exceeded its deadline of {deadline:?}")]
    DeadlineExceeded { deadline: Duration },
}

/// Coarse kind of a terminal error, for matching without destructuring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunErrorKind {
    Timeout,
    StepFailed,
    MaxRetriesExceeded,
    StepBudgetExhausted,
    DeadlineExceeded,
}

impl RunError {
    pub fn kind(&self) -> RunErrorKind {
        match self {
            RunError::Timeout { .. } => RunErrorKind::Timeout,
            RunError::StepFailed { .. } => RunErrorKind::StepFailed,
            RunError::MaxRetriesExceeded { .. } => RunErrorKind::MaxRetriesExceeded,
            RunError::StepBudgetExhausted { .. } => RunErrorKind::StepBudgetExhausted,
            RunError::DeadlineExceeded { .. } => RunErrorKind::DeadlineExceeded,
        }
    }

    /// Id of the failing step, when the failure is tied to one
    pub fn step_id(&self) -> Option<&str> {
        match self {
            RunError::Timeout { step_id, .. }
            | RunError::StepFailed { step_id, .. }
            | RunError::MaxRetriesExceeded { step_id, .. } => Some(step_id),
            RunError::StepBudgetExhausted { .. } | RunError::DeadlineExceeded { .. } => None,
        }
    }

    /// Attempts made at the failing step before the run terminated
    pub fn attempts(&self) -> Option<u32> {
        match self {
            RunError::Timeout { attempt, .. } | RunError::StepFailed { attempt, .. } => {
                Some(*attempt)
            }
            RunError::MaxRetriesExceeded { attempts, .. } => Some(*attempts),
            RunError::StepBudgetExhausted { .. } | RunError::DeadlineExceeded { .. } => None,
        }
    }
}

impl FixSuggestion for RunError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            RunError::Timeout { .. } => Some("Raise the step's timeout or make the step faster"),
            RunError::StepFailed { .. } => Some("Inspect the cause chain; fatal failures are not retried"),
            RunError::MaxRetriesExceeded { .. } => {
                Some("Raise max_retries or fix the underlying transient failure")
            }
            RunError::StepBudgetExhausted { .. } => {
                Some("Check loop predicates for a missing exit condition, or raise the budget")
            }
            RunError::DeadlineExceeded { .. } => {
                Some("Raise the run deadline or tighten per-step timeouts")
            }
        }
    }
}

/// Failure loading a policy table
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FixSuggestion for ConfigError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            ConfigError::YamlParse(_) => Some("Check YAML syntax: indentation and quoting"),
            ConfigError::Io(_) => Some("Check file path and permissions"),
        }
    }
}
