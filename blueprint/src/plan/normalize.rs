//! Shape validation and normalization of incoming plans

use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use super::{PlanNode, TaskNode};

/// Structural defect in an input plan. Fatal to the whole compile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanShapeError {
    #[error("{path}: expected a JSON object")]
    NotAnObject { path: String },

    #[error("{path}: missing required key '{key}'")]
    MissingKey { path: String, key: &'static str },

    #[error("{path}: '{key}' must be {expected}")]
    WrongType {
        path: String,
        key: String,
        expected: &'static str,
    },

    #[error("{path}: unknown node type '{found}'")]
    UnknownNodeType { path: String, found: String },

    #[error("duplicate task id '{0}'")]
    DuplicateTaskId(String),

    #[error("parallel task '{task_id}' depends on sibling task '{depends_on}'")]
    ParallelDependency { task_id: String, depends_on: String },
}

pub(super) fn normalize(value: &Value) -> Result<PlanNode, PlanShapeError> {
    let root = value.as_object().ok_or_else(|| PlanShapeError::NotAnObject {
        path: "$".to_string(),
    })?;

    if let Some(workflow) = root.get("workflow") {
        let stages = workflow.as_array().ok_or_else(|| PlanShapeError::WrongType {
            path: "$".to_string(),
            key: "workflow".to_string(),
            expected: "a list of stages",
        })?;
        return normalize_stages(stages);
    }

    if root.contains_key("type") {
        return normalize_node(value, "$");
    }

    Err(PlanShapeError::MissingKey {
        path: "$".to_string(),
        key: "workflow",
    })
}

/// Legacy staged form: stages run in ascending `stage` order, tasks within a
/// stage run in parallel.
fn normalize_stages(stages: &[Value]) -> Result<PlanNode, PlanShapeError> {
    let mut numbered = Vec::with_capacity(stages.len());

    for (idx, stage) in stages.iter().enumerate() {
        let path = format!("$.workflow[{}]", idx);
        let obj = stage
            .as_object()
            .ok_or_else(|| PlanShapeError::NotAnObject { path: path.clone() })?;

        let number = match obj.get("stage") {
            None | Some(Value::Null) => 0,
            Some(v) => v.as_i64().ok_or_else(|| PlanShapeError::WrongType {
                path: path.clone(),
                key: "stage".to_string(),
                expected: "an integer",
            })?,
        };

        let tasks = list_field(obj, "tasks", &path)?;
        let children = tasks
            .iter()
            .enumerate()
            .map(|(t, task)| parse_task(task, &format!("{}.tasks[{}]", path, t)))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(PlanNode::Task)
            .collect();

        numbered.push((number, PlanNode::Parallel(children)));
    }

    // Stable: equal stage numbers keep their declared order
    numbered.sort_by_key(|(number, _)| *number);

    Ok(PlanNode::Sequential(
        numbered.into_iter().map(|(_, node)| node).collect(),
    ))
}

/// Flat recursive form: `{type, tasks}` composites with `api_name` leaves.
fn normalize_node(value: &Value, path: &str) -> Result<PlanNode, PlanShapeError> {
    let obj = value.as_object().ok_or_else(|| PlanShapeError::NotAnObject {
        path: path.to_string(),
    })?;

    let Some(node_type) = obj.get("type") else {
        return parse_task(value, path).map(PlanNode::Task);
    };

    let node_type = node_type.as_str().ok_or_else(|| PlanShapeError::WrongType {
        path: path.to_string(),
        key: "type".to_string(),
        expected: "a string",
    })?;

    let children = list_field(obj, "tasks", path)?
        .iter()
        .enumerate()
        .map(|(idx, child)| normalize_node(child, &format!("{}.tasks[{}]", path, idx)))
        .collect::<Result<Vec<_>, _>>()?;

    match node_type {
        "sequential" => Ok(PlanNode::Sequential(children)),
        "parallel" => Ok(PlanNode::Parallel(children)),
        other => Err(PlanShapeError::UnknownNodeType {
            path: path.to_string(),
            found: other.to_string(),
        }),
    }
}

fn parse_task(value: &Value, path: &str) -> Result<TaskNode, PlanShapeError> {
    let obj = value.as_object().ok_or_else(|| PlanShapeError::NotAnObject {
        path: path.to_string(),
    })?;

    let capability = match obj.get("api_name") {
        None => {
            return Err(PlanShapeError::MissingKey {
                path: path.to_string(),
                key: "api_name",
            })
        }
        Some(v) => v.as_str().ok_or_else(|| PlanShapeError::WrongType {
            path: path.to_string(),
            key: "api_name".to_string(),
            expected: "a string",
        })?,
    };

    let task_id = optional_string(obj, "task_id", path)?;
    let description = optional_string(obj, "description", path)?;

    let mut inputs = IndexMap::new();
    match obj.get("inputs") {
        None | Some(Value::Null) => {}
        Some(Value::Object(map)) => {
            for (name, source) in map {
                let source = match source {
                    Value::Null => None,
                    Value::String(s) => Some(s.clone()),
                    _ => {
                        return Err(PlanShapeError::WrongType {
                            path: format!("{}.inputs", path),
                            key: name.clone(),
                            expected: "a string or null",
                        })
                    }
                };
                inputs.insert(name.clone(), source);
            }
        }
        Some(_) => {
            return Err(PlanShapeError::WrongType {
                path: path.to_string(),
                key: "inputs".to_string(),
                expected: "an object",
            })
        }
    }

    Ok(TaskNode {
        task_id,
        capability: capability.to_string(),
        inputs,
        description,
    })
}

fn list_field<'a>(
    obj: &'a Map<String, Value>,
    key: &'static str,
    path: &str,
) -> Result<&'a Vec<Value>, PlanShapeError> {
    match obj.get(key) {
        None => Err(PlanShapeError::MissingKey {
            path: path.to_string(),
            key,
        }),
        Some(v) => v.as_array().ok_or_else(|| PlanShapeError::WrongType {
            path: path.to_string(),
            key: key.to_string(),
            expected: "a list",
        }),
    }
}

fn optional_string(
    obj: &Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<Option<String>, PlanShapeError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(PlanShapeError::WrongType {
            path: path.to_string(),
            key: key.to_string(),
            expected: "a string",
        }),
    }
}

/// Tree-wide invariants: unique task ids, no dependencies between parallel siblings.
pub(super) fn check_invariants(root: &PlanNode) -> Result<(), PlanShapeError> {
    let mut seen = HashSet::new();
    let mut duplicate = None;
    root.for_each_task(&mut |task| {
        if let Some(id) = &task.task_id {
            if !seen.insert(id.clone()) && duplicate.is_none() {
                duplicate = Some(id.clone());
            }
        }
    });
    if let Some(id) = duplicate {
        return Err(PlanShapeError::DuplicateTaskId(id));
    }

    check_parallel_independence(root)
}

fn check_parallel_independence(node: &PlanNode) -> Result<(), PlanShapeError> {
    match node {
        PlanNode::Task(_) => Ok(()),
        PlanNode::Sequential(children) => children.iter().try_for_each(check_parallel_independence),
        PlanNode::Parallel(children) => {
            // task id -> index of the sibling subtree that owns it
            let mut owner: HashMap<&str, usize> = HashMap::new();
            for (idx, child) in children.iter().enumerate() {
                child.for_each_task(&mut |task| {
                    if let Some(id) = task.task_id.as_deref() {
                        owner.insert(id, idx);
                    }
                });
            }

            for (idx, child) in children.iter().enumerate() {
                let mut violation = None;
                child.for_each_task(&mut |task| {
                    if violation.is_some() {
                        return;
                    }
                    for reference in task.references() {
                        if matches!(owner.get(reference.task_id.as_str()), Some(o) if *o != idx) {
                            violation = Some(PlanShapeError::ParallelDependency {
                                task_id: task.label().to_string(),
                                depends_on: reference.task_id.clone(),
                            });
                            return;
                        }
                    }
                });
                if let Some(err) = violation {
                    return Err(err);
                }
                check_parallel_independence(child)?;
            }
            Ok(())
        }
    }
}
