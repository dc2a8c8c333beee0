//! Planned actions and apply bookkeeping

use serde::{Deserialize, Serialize};

/// Type of action to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a new resource or key
    Create,
    /// Update an existing resource or key
    Update,
    /// Delete a resource or key
    Delete,
    /// No changes needed
    NoOp,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// Anything that can appear in a [`Plan`].
pub trait Planned {
    fn action_type(&self) -> ActionType;
}

/// Ordered list of actions produced by a diff engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan<A> {
    pub actions: Vec<A>,
}

impl<A> Default for Plan<A> {
    fn default() -> Self {
        Self {
            actions: Vec::new(),
        }
    }
}

impl<A: Planned> Plan<A> {
    pub fn new(actions: Vec<A>) -> Self {
        Self { actions }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether applying the plan would issue any provider call
    pub fn has_changes(&self) -> bool {
        self.actions
            .iter()
            .any(|a| a.action_type() != ActionType::NoOp)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &A> {
        self.actions.iter()
    }

    fn count(&self, action_type: ActionType) -> usize {
        self.actions
            .iter()
            .filter(|a| a.action_type() == action_type)
            .count()
    }

    /// Summary of the plan
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.count(ActionType::Create),
            update: self.count(ActionType::Update),
            delete: self.count(ActionType::Delete),
            no_change: self.count(ActionType::NoOp),
        }
    }
}

impl<A> IntoIterator for Plan<A> {
    type Item = A;
    type IntoIter = std::vec::IntoIter<A>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.into_iter()
    }
}

/// Summary of planned actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub no_change: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete, {} unchanged",
            self.create, self.update, self.delete, self.no_change
        )
    }
}

/// Outcome of reconciling a batch of resources
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyResult {
    pub succeeded: Vec<ActionResult>,
    pub failed: Vec<ActionResult>,
    pub duration_ms: u64,
}

impl ApplyResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn add_success(&mut self, address: impl Into<String>, message: impl Into<String>) {
        self.succeeded.push(ActionResult {
            address: address.into(),
            success: true,
            message: message.into(),
            error: None,
        });
    }

    pub fn add_failure(&mut self, address: impl Into<String>, error: impl Into<String>) {
        self.failed.push(ActionResult {
            address: address.into(),
            success: false,
            message: String::new(),
            error: Some(error.into()),
        });
    }
}

/// Result for a single resource address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    /// Resource address, e.g. `server.web`
    pub address: String,
    pub success: bool,
    pub message: String,
    pub error: Option<String>,
}
