//! Step contract (v0.1)
//!
//! A step consumes a read-only view of the run state and returns a partial
//! update to merge. Timeout and retry policy are attached at registration;
//! failure classification lives on the step itself.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::FailureClass;
use crate::state::{State, StateDelta};

/// Default wall-clock bound for a single step attempt (60 seconds)
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(60);

/// Unit of work in a compiled graph
///
/// Implementations perform their own side effects (network calls, file
/// reads, model invocations); the executor bounds wall-clock duration and
/// owns all retry handling. A step that could not determine a value leaves
/// that key out of the delta rather than raising.
#[async_trait]
pub trait Step: Send + Sync {
    /// Run the step against a read-only snapshot of the current state
    ///
    /// Returns the keys to merge; keys left out of the delta are untouched
    /// by this step's execution.
    async fn execute(&self, state: &State) -> anyhow::Result<StateDelta>;

    /// Map a failure raised by `execute` to a retry class
    ///
    /// Every failure is transient unless the step says otherwise. Timeouts
    /// arrive here as a downcastable [`crate::error::StepTimeout`].
    fn classify(&self, _error: &anyhow::Error) -> FailureClass {
        FailureClass::Transient
    }
}

/// Per-step timeout and retry policy, attached at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPolicy {
    /// Wall-clock bound for a single attempt
    pub timeout: Duration,
    /// Retries allowed after the first attempt (0 = fail on first error)
    pub max_retries: u32,
}

impl Default for StepPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_STEP_TIMEOUT,
            max_retries: 0,
        }
    }
}

impl StepPolicy {
    pub fn new(timeout: Duration, max_retries: u32) -> Self {
        Self {
            timeout,
            max_retries,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Failure classifier override for [`FnStep`]
pub type Classifier = Arc<dyn Fn(&anyhow::Error) -> FailureClass + Send + Sync>;

/// Adapter turning an async closure into a [`Step`]
///
/// The closure receives an owned snapshot of the state. Classification is
/// transient-by-default unless a classifier is attached.
pub struct FnStep<F> {
    func: F,
    classifier: Option<Classifier>,
}

impl<F, Fut> FnStep<F>
where
    F: Fn(State) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<StateDelta>> + Send,
{
    pub fn new(func: F) -> Self {
        Self {
            func,
            classifier: None,
        }
    }

    pub fn with_classifier(
        mut self,
        classifier: impl Fn(&anyhow::Error) -> FailureClass + Send + Sync + 'static,
    ) -> Self {
        self.classifier = Some(Arc::new(classifier));
        self
    }
}

#[async_trait]
impl<F, Fut> Step for FnStep<F>
where
    F: Fn(State) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<StateDelta>> + Send,
{
    async fn execute(&self, state: &State) -> anyhow::Result<StateDelta> {
        (self.func)(state.clone()).await
    }

    fn classify(&self, error: &anyhow::Error) -> FailureClass {
        match &self.classifier {
            Some(classifier) => classifier(error),
            None => FailureClass::Transient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use serde_json::json;

    #[tokio::test]
    async fn fn_step_executes_closure() {
        let step = FnStep::new(|state: State| async move {
            let mut delta = StateDelta::new();
            let seen = state.len() as u64;
            delta.insert("seen_keys", json!(seen));
            Ok(delta)
        });

        let mut state = State::new();
        state.insert("raw", json!("<html></html>"));

        let delta = step.execute(&state).await.unwrap();
        assert_eq!(delta.get("seen_keys"), Some(&json!(1)));
    }

    #[test]
    fn default_classification_is_transient() {
        let step = FnStep::new(|_state: State| async move { Ok(StateDelta::new()) });
        let err = anyhow!("connection reset");
        assert_eq!(step.classify(&err), FailureClass::Transient);
    }

    #[test]
    fn classifier_override_wins() {
        let step = FnStep::new(|_state: State| async move { Ok(StateDelta::new()) })
            .with_classifier(|_err| FailureClass::Fatal);
        let err = anyhow!("bad input");
        assert_eq!(step.classify(&err), FailureClass::Fatal);
    }

    #[test]
    fn policy_builders() {
        let policy = StepPolicy::default()
            .with_timeout(Duration::from_secs(30))
            .with_max_retries(2);
        assert_eq!(policy.timeout, Duration::from_secs(30));
        assert_eq!(policy.max_retries, 2);
    }
}
