//! Plan model
//!
//! Canonical, shape-independent representation of a task plan. Both accepted
//! input shapes (legacy staged and flat recursive) are normalized into a
//! [`PlanNode`] tree by [`Plan::from_value`]; nothing downstream branches on
//! the original shape.

mod normalize;

pub use normalize::PlanShapeError;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static REFERENCE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^ref:([^.\s]+)\.outputs\.(\S+)$").expect("reference pattern is valid")
});

/// Reference to a future output of an upstream task: `ref:<task_id>.outputs.<field>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskReference {
    pub task_id: String,
    pub field: String,
    /// The literal reference string as written in the plan
    pub raw: String,
}

impl TaskReference {
    /// Parse a declared input value. Returns `None` for anything that is not a
    /// well-formed reference (including placeholders like `from_user_input`).
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let caps = REFERENCE_PATTERN.captures(value)?;
        Some(Self {
            task_id: caps[1].to_string(),
            field: caps[2].to_string(),
            raw: value.to_string(),
        })
    }
}

/// A leaf of the plan: one call to a named capability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskNode {
    /// Plan-unique id; the flat shape allows it to be omitted
    pub task_id: Option<String>,
    /// Capability name, used as the resolver query
    pub capability: String,
    /// Declared inputs: parameter name -> raw source string, `None` meaning
    /// "derive from the request text"
    pub inputs: IndexMap<String, Option<String>>,
    pub description: Option<String>,
}

impl TaskNode {
    pub fn new(capability: impl Into<String>) -> Self {
        Self {
            task_id: None,
            capability: capability.into(),
            inputs: IndexMap::new(),
            description: None,
        }
    }

    pub fn with_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_input(mut self, name: impl Into<String>, source: Option<&str>) -> Self {
        self.inputs.insert(name.into(), source.map(str::to_string));
        self
    }

    /// The declared reference for a parameter, if the input is a well-formed reference.
    pub fn reference_for(&self, param: &str) -> Option<TaskReference> {
        self.inputs
            .get(param)
            .and_then(|source| source.as_deref())
            .and_then(TaskReference::parse)
    }

    /// All well-formed references declared by this task.
    pub fn references(&self) -> impl Iterator<Item = TaskReference> + '_ {
        self.inputs
            .values()
            .filter_map(|source| source.as_deref().and_then(TaskReference::parse))
    }

    /// Label used in log lines.
    pub fn label(&self) -> &str {
        self.task_id.as_deref().unwrap_or(&self.capability)
    }
}

/// Canonical plan tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "tasks", rename_all = "snake_case")]
pub enum PlanNode {
    Task(TaskNode),
    Sequential(Vec<PlanNode>),
    Parallel(Vec<PlanNode>),
}

impl PlanNode {
    /// Visit every task leaf in declared order.
    pub fn for_each_task<'a>(&'a self, f: &mut impl FnMut(&'a TaskNode)) {
        match self {
            PlanNode::Task(task) => f(task),
            PlanNode::Sequential(children) | PlanNode::Parallel(children) => {
                for child in children {
                    child.for_each_task(f);
                }
            }
        }
    }

    pub fn task_count(&self) -> usize {
        let mut count = 0;
        self.for_each_task(&mut |_| count += 1);
        count
    }
}

/// A validated, normalized plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub root: PlanNode,
}

impl Plan {
    /// Validate and normalize either accepted input shape.
    ///
    /// All structural checks run here, before any capability resolution.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, PlanShapeError> {
        let root = normalize::normalize(value)?;
        normalize::check_invariants(&root)?;
        Ok(Self { root })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reference() {
        let r = TaskReference::parse("ref:t1.outputs.id").expect("valid reference");
        assert_eq!(r.task_id, "t1");
        assert_eq!(r.field, "id");
        assert_eq!(r.raw, "ref:t1.outputs.id");

        let nested = TaskReference::parse("ref:get_info.outputs.manager.id").unwrap();
        assert_eq!(nested.task_id, "get_info");
        assert_eq!(nested.field, "manager.id");
    }

    #[test]
    fn test_non_references() {
        assert_eq!(TaskReference::parse("from_user_input"), None);
        assert_eq!(TaskReference::parse("ref:t1"), None);
        assert_eq!(TaskReference::parse("ref:t1.output.id"), None);
        assert_eq!(TaskReference::parse("ref:.outputs.id"), None);
        assert_eq!(TaskReference::parse("t1.outputs.id"), None);
    }

    #[test]
    fn test_task_references() {
        let task = TaskNode::new("提交请假")
            .with_id("t2")
            .with_input("employee_id", Some("ref:t1.outputs.id"))
            .with_input("reason", Some("from_user_input"))
            .with_input("days", None);

        assert_eq!(task.references().count(), 1);
        assert!(task.reference_for("employee_id").is_some());
        assert!(task.reference_for("reason").is_none());
        assert!(task.reference_for("days").is_none());
        assert!(task.reference_for("unknown").is_none());
    }
}
