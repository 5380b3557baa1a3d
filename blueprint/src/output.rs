//! Compiled blueprint types
//!
//! These serialize to the wire format consumed by whatever executes the
//! blueprint. Field order is fixed by declaration order; optional fields are
//! omitted rather than emitted empty.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::capability::ParameterDefinition;

/// Where a missing parameter is expected to come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingSource {
    /// Deferred to an upstream task's output at execution time
    Reference,
    /// Must be supplied by the requester; extraction found nothing
    UserInput,
}

/// A parameter the compiler could not bind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    pub description: String,
    pub required: bool,
    pub source: MissingSource,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl MissingParameter {
    pub fn from_definition(
        param: &ParameterDefinition,
        source: MissingSource,
        reference: Option<String>,
    ) -> Self {
        Self {
            name: param.name.clone(),
            param_type: param.param_type.clone(),
            description: param.description.clone(),
            required: param.required,
            source,
            reference,
        }
    }
}

/// Fully resolved call for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskBlueprint {
    pub description: String,
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<IndexMap<String, serde_json::Value>>,
    /// Sorted ascending by name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<MissingParameter>>,
}

impl TaskBlueprint {
    pub fn missing(&self) -> &[MissingParameter] {
        self.missing.as_deref().unwrap_or(&[])
    }
}

/// Task-level failure embedded in place of a blueprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub error: String,
    pub capability_name: String,
}

impl TaskError {
    pub const CAPABILITY_NOT_FOUND: &'static str = "capability not found";

    pub fn capability_not_found(capability_name: impl Into<String>) -> Self {
        Self {
            error: Self::CAPABILITY_NOT_FOUND.to_string(),
            capability_name: capability_name.into(),
        }
    }
}

/// Outcome of compiling a single task leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskOutcome {
    Compiled(TaskBlueprint),
    Failed(TaskError),
}

impl TaskOutcome {
    pub fn blueprint(&self) -> Option<&TaskBlueprint> {
        match self {
            TaskOutcome::Compiled(bp) => Some(bp),
            TaskOutcome::Failed(_) => None,
        }
    }
}

/// Kind of a composite group in the output tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    Sequential,
    Parallel,
}

/// One element of a compiled workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlueprintNode {
    Group {
        #[serde(rename = "type")]
        kind: GroupKind,
        tasks: Vec<BlueprintNode>,
    },
    Task(TaskOutcome),
}

impl BlueprintNode {
    /// Visit every task outcome in output order.
    pub fn for_each_task<'a>(&'a self, f: &mut impl FnMut(&'a TaskOutcome)) {
        match self {
            BlueprintNode::Task(outcome) => f(outcome),
            BlueprintNode::Group { tasks, .. } => {
                for task in tasks {
                    task.for_each_task(f);
                }
            }
        }
    }
}

/// The top-level sequential workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowBlueprint {
    #[serde(rename = "type")]
    pub kind: GroupKind,
    pub tasks: Vec<BlueprintNode>,
}

impl WorkflowBlueprint {
    pub fn sequential(tasks: Vec<BlueprintNode>) -> Self {
        Self {
            kind: GroupKind::Sequential,
            tasks,
        }
    }

    pub fn task_outcomes(&self) -> Vec<&TaskOutcome> {
        let mut outcomes = vec![];
        for node in &self.tasks {
            node.for_each_task(&mut |o| outcomes.push(o));
        }
        outcomes
    }
}

/// Result of one compile call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CompileOutput {
    Workflow { workflow: WorkflowBlueprint },
    Rejected { error: String },
}

impl CompileOutput {
    pub const INVALID_PLAN_SHAPE: &'static str = "invalid plan shape";

    pub fn invalid_plan_shape() -> Self {
        CompileOutput::Rejected {
            error: Self::INVALID_PLAN_SHAPE.to_string(),
        }
    }

    pub fn workflow(&self) -> Option<&WorkflowBlueprint> {
        match self {
            CompileOutput::Workflow { workflow } => Some(workflow),
            CompileOutput::Rejected { .. } => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, CompileOutput::Rejected { .. })
    }
}
