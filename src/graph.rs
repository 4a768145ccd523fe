//! Graph construction and compile-time validation (v0.1)
//!
//! [`GraphBuilder`] collects steps, transitions, and the entry id;
//! `compile()` validates the declaration and produces an immutable
//! [`CompiledGraph`]. Compilation consumes the builder, so a compiled graph
//! can never grow new edges. Cycles are allowed: iterative refinement loops
//! are bounded by state-derived predicates, not by the compiler.
//!
//! Uses Arc<str> for zero-cost cloning of step ids.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::error::ValidationError;
use crate::state::State;
use crate::step::{Step, StepPolicy};

/// Predicate evaluated against the post-merge state to pick a branch
pub type Predicate = Arc<dyn Fn(&State) -> bool + Send + Sync>;

/// Conditional branch out of a step, evaluated in declaration order
pub(crate) struct Branch {
    pub(crate) predicate: Predicate,
    pub(crate) target: Arc<str>,
}

/// Transitions out of one step: ordered branches plus an optional default
#[derive(Default)]
pub(crate) struct Transitions {
    pub(crate) branches: Vec<Branch>,
    pub(crate) default: Option<Arc<str>>,
}

/// Registered step with its policy
pub(crate) struct StepEntry {
    pub(crate) step: Arc<dyn Step>,
    pub(crate) policy: StepPolicy,
}

enum EdgeDecl {
    Direct {
        from: String,
        to: String,
    },
    Conditional {
        from: String,
        predicate: Predicate,
        when_true: String,
        when_false: String,
    },
    Branch {
        from: String,
        predicate: Predicate,
        target: String,
    },
}

/// Collects a graph declaration for compilation
///
/// Methods chain; nothing is validated until `compile()`.
#[derive(Default)]
pub struct GraphBuilder {
    steps: Vec<(String, Arc<dyn Step>, StepPolicy)>,
    edges: Vec<EdgeDecl>,
    entries: Vec<String>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a step under a unique id with its timeout/retry policy
    pub fn add_step(
        mut self,
        id: impl Into<String>,
        step: impl Step + 'static,
        policy: StepPolicy,
    ) -> Self {
        self.steps.push((id.into(), Arc::new(step), policy));
        self
    }

    /// Declare an unconditional edge: `to` becomes the default successor of
    /// `from`, taken when no conditional branch matches
    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push(EdgeDecl::Direct {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// Declare a conditional edge
    ///
    /// Appends the branch `(predicate, when_true)` to `from`'s ordered
    /// branch list and routes the no-match case to `when_false`. Branches
    /// declared earlier are evaluated first; the first predicate returning
    /// true wins.
    pub fn add_conditional_edge(
        mut self,
        from: impl Into<String>,
        predicate: impl Fn(&State) -> bool + Send + Sync + 'static,
        when_true: impl Into<String>,
        when_false: impl Into<String>,
    ) -> Self {
        self.edges.push(EdgeDecl::Conditional {
            from: from.into(),
            predicate: Arc::new(predicate),
            when_true: when_true.into(),
            when_false: when_false.into(),
        });
        self
    }

    /// Append a conditional branch without touching the default successor
    ///
    /// Useful when several predicates from one step share a single fallback
    /// declared via `add_edge` or a conditional edge's false target.
    pub fn add_branch(
        mut self,
        from: impl Into<String>,
        predicate: impl Fn(&State) -> bool + Send + Sync + 'static,
        target: impl Into<String>,
    ) -> Self {
        self.edges.push(EdgeDecl::Branch {
            from: from.into(),
            predicate: Arc::new(predicate),
            target: target.into(),
        });
        self
    }

    /// Designate the step at which execution begins
    pub fn set_entry(mut self, id: impl Into<String>) -> Self {
        self.entries.push(id.into());
        self
    }

    /// Validate the declaration and produce an immutable graph
    pub fn compile(self) -> Result<CompiledGraph, ValidationError> {
        // Create Arc<str> once per step, reuse everywhere
        let mut steps: HashMap<Arc<str>, StepEntry> = HashMap::with_capacity(self.steps.len());
        let mut ids: HashSet<Arc<str>> = HashSet::with_capacity(self.steps.len());

        for (id, step, policy) in self.steps {
            let id: Arc<str> = Arc::from(id.as_str());
            if !ids.insert(Arc::clone(&id)) {
                return Err(ValidationError::DuplicateStep(id.to_string()));
            }
            steps.insert(id, StepEntry { step, policy });
        }

        let entry = match self.entries.as_slice() {
            [] => return Err(ValidationError::MissingEntry),
            [single] => single.clone(),
            [first, second, ..] => {
                return Err(ValidationError::DuplicateEntry {
                    first: first.clone(),
                    second: second.clone(),
                })
            }
        };
        let Some(entry) = ids.get(entry.as_str()).cloned() else {
            return Err(ValidationError::UnknownEntry(entry));
        };

        let mut transitions: HashMap<Arc<str>, Transitions> = HashMap::new();
        for edge in self.edges {
            match edge {
                EdgeDecl::Direct { from, to } => {
                    let (from, to) = resolve_endpoints(&ids, &from, &to)?;
                    set_default(transitions.entry(from.clone()).or_default(), &from, to)?;
                }
                EdgeDecl::Conditional {
                    from,
                    predicate,
                    when_true,
                    when_false,
                } => {
                    let (from, when_true) = resolve_endpoints(&ids, &from, &when_true)?;
                    let when_false = resolve_target(&ids, &from, &when_false)?;
                    let slot = transitions.entry(from.clone()).or_default();
                    slot.branches.push(Branch {
                        predicate,
                        target: when_true,
                    });
                    set_default(slot, &from, when_false)?;
                }
                EdgeDecl::Branch {
                    from,
                    predicate,
                    target,
                } => {
                    let (from, target) = resolve_endpoints(&ids, &from, &target)?;
                    transitions
                        .entry(from)
                        .or_default()
                        .branches
                        .push(Branch { predicate, target });
                }
            }
        }

        Ok(CompiledGraph {
            steps,
            transitions,
            entry,
        })
    }
}

fn resolve_endpoints(
    ids: &HashSet<Arc<str>>,
    from: &str,
    to: &str,
) -> Result<(Arc<str>, Arc<str>), ValidationError> {
    let from_arc = ids.get(from).cloned().ok_or_else(|| dangling(from, to))?;
    let to_arc = resolve_target(ids, &from_arc, to)?;
    Ok((from_arc, to_arc))
}

fn resolve_target(
    ids: &HashSet<Arc<str>>,
    from: &str,
    to: &str,
) -> Result<Arc<str>, ValidationError> {
    ids.get(to).cloned().ok_or_else(|| dangling(from, to))
}

fn dangling(from: &str, to: &str) -> ValidationError {
    ValidationError::DanglingEdge {
        from: from.to_string(),
        to: to.to_string(),
    }
}

/// Set a step's default successor, rejecting a conflicting re-declaration
///
/// Re-declaring the same target is fine: several conditional edges from one
/// step routinely share one fallback.
fn set_default(
    slot: &mut Transitions,
    from: &Arc<str>,
    to: Arc<str>,
) -> Result<(), ValidationError> {
    match &slot.default {
        Some(existing) if **existing != *to => Err(ValidationError::ConflictingDefault {
            step_id: from.to_string(),
            first: existing.to_string(),
            second: to.to_string(),
        }),
        _ => {
            slot.default = Some(to);
            Ok(())
        }
    }
}

/// Validated, immutable graph ready for execution
///
/// Safe to share across concurrent runs: every run owns its own state and
/// trace and only reads the graph.
pub struct CompiledGraph {
    steps: HashMap<Arc<str>, StepEntry>,
    transitions: HashMap<Arc<str>, Transitions>,
    entry: Arc<str>,
}

impl CompiledGraph {
    /// Id of the step at which execution begins
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Check if a step id is registered
    pub fn contains(&self, id: &str) -> bool {
        self.steps.contains_key(id)
    }

    /// Number of registered steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub(crate) fn entry_arc(&self) -> Arc<str> {
        Arc::clone(&self.entry)
    }

    pub(crate) fn step(&self, id: &str) -> Option<&StepEntry> {
        self.steps.get(id)
    }

    /// Resolve the successor of `from` against the post-merge state
    ///
    /// Branches are evaluated strictly in declaration order and the first
    /// predicate returning true wins; with no match the default edge is
    /// taken; with no default the step is terminal and `None` is returned.
    pub(crate) fn next_step(&self, from: &str, state: &State) -> Option<Arc<str>> {
        let transitions = self.transitions.get(from)?;
        for branch in &transitions.branches {
            if (branch.predicate)(state) {
                return Some(Arc::clone(&branch.target));
            }
        }
        transitions.default.clone()
    }
}

impl fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("entry", &self.entry)
            .field("steps", &self.steps.len())
            .finish()
    }
}
