//! Policy tables loaded from YAML (v0.1)
//!
//! A configuration loader supplies per-step timeout/retry values before
//! graph construction; the engine treats the table as immutable input.
//! Step ids missing from the table fall back to the table's default policy.
//!
//! ```yaml
//! default:
//!   timeout_secs: 60
//!   max_retries: 0
//! steps:
//!   fetch:
//!     timeout_secs: 30
//!     max_retries: 2
//!   extract:
//!     timeout_secs: 120
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::step::{StepPolicy, DEFAULT_STEP_TIMEOUT};

/// Per-step policy as written in YAML
#[derive(Debug, Deserialize)]
struct PolicyRaw {
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
    #[serde(default)]
    max_retries: u32,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_STEP_TIMEOUT.as_secs()
}

impl From<PolicyRaw> for StepPolicy {
    fn from(raw: PolicyRaw) -> Self {
        StepPolicy {
            timeout: Duration::from_secs(raw.timeout_secs),
            max_retries: raw.max_retries,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PolicyTableRaw {
    #[serde(default)]
    default: Option<PolicyRaw>,
    #[serde(default)]
    steps: HashMap<String, PolicyRaw>,
}

/// Per-step policies keyed by step id, with a fallback default
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    policies: HashMap<String, StepPolicy>,
    default: StepPolicy,
}

impl PolicyTable {
    /// Create an empty table where every id resolves to `StepPolicy::default()`
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a table from a YAML string
    pub fn from_yaml(input: &str) -> Result<Self, ConfigError> {
        let raw: PolicyTableRaw = serde_yaml::from_str(input)?;
        Ok(Self {
            default: raw.default.map(Into::into).unwrap_or_default(),
            policies: raw
                .steps
                .into_iter()
                .map(|(id, policy)| (id, policy.into()))
                .collect(),
        })
    }

    /// Read and parse a table from a YAML file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path)?;
        Self::from_yaml(&input)
    }

    /// Policy for a step id, falling back to the table default
    pub fn policy_for(&self, step_id: &str) -> StepPolicy {
        self.policies
            .get(step_id)
            .copied()
            .unwrap_or(self.default)
    }

    /// Override a single step's policy
    pub fn set(&mut self, step_id: impl Into<String>, policy: StepPolicy) {
        self.policies.insert(step_id.into(), policy);
    }

    /// Replace the fallback default
    pub fn with_default(mut self, policy: StepPolicy) -> Self {
        self.default = policy;
        self
    }
}
