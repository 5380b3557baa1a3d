//! Parameter provenance and binding
//!
//! Every declared parameter of a resolved capability ends up in exactly one of
//! three states: bound to an extracted value, missing because it is deferred to
//! an upstream task (`reference`), or missing because extraction found nothing
//! (`user_input`).

pub mod template;

use indexmap::IndexMap;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use crate::capability::{CapabilityDescriptor, ParameterDefinition};
use crate::output::MissingSource;
use crate::plan::{TaskNode, TaskReference};

pub use template::{bind_template, BoundRequest};

/// Resolution state of a single parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterBinding {
    Bound(Value),
    Missing {
        source: MissingSource,
        reference: Option<String>,
    },
}

impl ParameterBinding {
    pub fn from_reference(reference: &TaskReference) -> Self {
        ParameterBinding::Missing {
            source: MissingSource::Reference,
            reference: Some(reference.raw.clone()),
        }
    }

    pub fn user_input_missing() -> Self {
        ParameterBinding::Missing {
            source: MissingSource::UserInput,
            reference: None,
        }
    }
}

/// Bindings keyed by parameter name, in declared parameter order.
pub type Bindings = IndexMap<String, ParameterBinding>;

/// Declared parameters split by provenance.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    /// Parameters deferred to an upstream task output
    pub reference_bound: Vec<(ParameterDefinition, TaskReference)>,
    /// Parameters whose values must come from the request text
    pub needs_extraction: Vec<ParameterDefinition>,
}

/// Split a capability's declared parameters into reference-bound and needs-extraction.
///
/// A parameter name declared twice is classified once, by its first declaration.
pub fn classify(capability: &CapabilityDescriptor, task: &TaskNode) -> Classification {
    let mut classification = Classification::default();
    let mut seen = HashSet::new();
    for param in &capability.params {
        if !seen.insert(param.name.as_str()) {
            continue;
        }
        match task.reference_for(&param.name) {
            Some(reference) => classification
                .reference_bound
                .push((param.clone(), reference)),
            None => classification.needs_extraction.push(param.clone()),
        }
    }
    classification
}

/// Whether an extracted value counts as a real value.
///
/// Null, empty strings, empty containers and the missing sentinel do not.
pub fn is_present(value: &Value, sentinel: &str) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty() && s != sentinel,
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// Combine classification and extraction results into per-parameter bindings.
///
/// Keyed by name, so a repeated declaration yields a single binding.
///
/// `extracted` is `None` when extraction was skipped or failed; every
/// needs-extraction parameter is then missing from user input.
pub fn resolve_bindings(
    capability: &CapabilityDescriptor,
    classification: &Classification,
    extracted: Option<&HashMap<String, Value>>,
    sentinel: &str,
) -> Bindings {
    let mut by_name: HashMap<&str, ParameterBinding> = HashMap::new();

    for (param, reference) in &classification.reference_bound {
        by_name.insert(&param.name, ParameterBinding::from_reference(reference));
    }

    for param in &classification.needs_extraction {
        let binding = match extracted.and_then(|values| values.get(&param.name)) {
            Some(value) if is_present(value, sentinel) => ParameterBinding::Bound(value.clone()),
            _ => ParameterBinding::user_input_missing(),
        };
        by_name.insert(&param.name, binding);
    }

    capability
        .params
        .iter()
        .filter_map(|param| {
            by_name
                .remove(param.name.as_str())
                .map(|binding| (param.name.clone(), binding))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn leave_capability() -> CapabilityDescriptor {
        CapabilityDescriptor::new("提交请假申请", "POST", "/api/employees/{employee_id}/leave")
            .with_param(ParameterDefinition::new("employee_id", "string").required())
            .with_param(ParameterDefinition::new("start_date", "date").required())
            .with_param(ParameterDefinition::new("reason", "string"))
    }

    #[test]
    fn test_classify_splits_by_provenance() {
        let task = TaskNode::new("提交请假申请")
            .with_input("employee_id", Some("ref:t1.outputs.id"))
            .with_input("start_date", Some("from_user_input"));

        let classification = classify(&leave_capability(), &task);

        assert_eq!(classification.reference_bound.len(), 1);
        assert_eq!(classification.reference_bound[0].0.name, "employee_id");
        assert_eq!(classification.reference_bound[0].1.raw, "ref:t1.outputs.id");

        let names: Vec<_> = classification
            .needs_extraction
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["start_date", "reason"]);
    }

    #[test]
    fn test_is_present() {
        let sentinel = "__MISSING__";
        assert!(is_present(&json!("2025-08-01"), sentinel));
        assert!(is_present(&json!(0), sentinel));
        assert!(is_present(&json!(false), sentinel));
        assert!(!is_present(&json!(null), sentinel));
        assert!(!is_present(&json!(""), sentinel));
        assert!(!is_present(&json!("__MISSING__"), sentinel));
        assert!(!is_present(&json!([]), sentinel));
        assert!(!is_present(&json!({}), sentinel));
    }

    #[test]
    fn test_resolve_bindings_declared_order() {
        let capability = leave_capability();
        let task = TaskNode::new("提交请假申请").with_input("employee_id", Some("ref:t1.outputs.id"));
        let classification = classify(&capability, &task);

        let extracted: HashMap<String, Value> = [
            ("start_date".to_string(), json!("2025-08-01")),
            ("reason".to_string(), json!("__MISSING__")),
            ("unrequested".to_string(), json!("ignored")),
        ]
        .into_iter()
        .collect();

        let bindings = resolve_bindings(&capability, &classification, Some(&extracted), "__MISSING__");

        let names: Vec<_> = bindings.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["employee_id", "start_date", "reason"]);
        assert_eq!(
            bindings["employee_id"],
            ParameterBinding::Missing {
                source: MissingSource::Reference,
                reference: Some("ref:t1.outputs.id".to_string()),
            }
        );
        assert_eq!(bindings["start_date"], ParameterBinding::Bound(json!("2025-08-01")));
        assert_eq!(bindings["reason"], ParameterBinding::user_input_missing());
    }

    #[test]
    fn test_failed_extraction_marks_everything_missing() {
        let capability = leave_capability();
        let classification = classify(&capability, &TaskNode::new("提交请假申请"));
        let bindings = resolve_bindings(&capability, &classification, None, "__MISSING__");
        assert_eq!(bindings.len(), 3);
        assert!(bindings
            .values()
            .all(|b| *b == ParameterBinding::user_input_missing()));
    }

    #[test]
    fn test_repeated_declaration_bound_once() {
        let capability = CapabilityDescriptor::new("x", "POST", "/x")
            .with_param(ParameterDefinition::new("a", "string"))
            .with_param(ParameterDefinition::new("b", "string"))
            .with_param(ParameterDefinition::new("a", "integer"));
        let classification = classify(&capability, &TaskNode::new("x"));
        let requested: Vec<_> = classification
            .needs_extraction
            .iter()
            .map(|p| (p.name.as_str(), p.param_type.as_str()))
            .collect();
        assert_eq!(requested, vec![("a", "string"), ("b", "string")]);

        let bindings = resolve_bindings(&capability, &classification, None, "__MISSING__");
        let names: Vec<_> = bindings.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
