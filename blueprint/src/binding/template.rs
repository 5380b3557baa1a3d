//! URL template binding
//!
//! A parameter named by a `{name}` placeholder in the endpoint template is a
//! path parameter; every other declared parameter is a payload parameter.
//! Placeholder membership decides: a path parameter is never copied into the body.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use super::{Bindings, ParameterBinding};
use crate::capability::{CapabilityDescriptor, ParameterDefinition};
use crate::output::{MissingParameter, MissingSource};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([^{}\s]+)\}").expect("placeholder pattern is valid"));

/// Placeholder names in a template, deduplicated, in order of first appearance.
pub fn placeholders(template: &str) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(template) {
        if let Some(m) = caps.get(1) {
            if !names.contains(&m.as_str()) {
                names.push(m.as_str());
            }
        }
    }
    names
}

/// Result of binding one capability call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoundRequest {
    pub url: String,
    pub body: IndexMap<String, Value>,
    /// Sorted ascending by name
    pub missing: Vec<MissingParameter>,
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Substitute bound path parameters into the endpoint and collect the payload.
///
/// The endpoint is rendered in one pass over the original template, so a bound
/// value that happens to contain `{other}` is never substituted again.
/// Parameters are taken by name; a repeated declaration is ignored.
pub fn bind_template(capability: &CapabilityDescriptor, bindings: &Bindings) -> BoundRequest {
    let slots = placeholders(&capability.endpoint);
    let mut path_values: HashMap<&str, String> = HashMap::new();
    let mut body = IndexMap::new();
    let mut missing = Vec::new();
    let mut seen = HashSet::new();

    for param in &capability.params {
        if !seen.insert(param.name.as_str()) {
            log::warn!(
                "'{}' declares parameter '{}' more than once",
                capability.name,
                param.name
            );
            continue;
        }

        let binding = bindings
            .get(&param.name)
            .cloned()
            .unwrap_or_else(ParameterBinding::user_input_missing);
        let is_path = slots.contains(&param.name.as_str());

        match binding {
            ParameterBinding::Bound(value) if is_path => {
                path_values.insert(&param.name, render_value(&value));
            }
            ParameterBinding::Bound(value) => {
                body.insert(param.name.clone(), value);
            }
            ParameterBinding::Missing { source, reference } => {
                missing.push(MissingParameter::from_definition(param, source, reference));
            }
        }
    }

    let url = PLACEHOLDER
        .replace_all(&capability.endpoint, |caps: &Captures| {
            path_values
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned();

    // Placeholders with no declared parameter stay unrendered and are reported
    for slot in slots {
        if seen.contains(slot) {
            continue;
        }
        log::warn!(
            "Endpoint '{}' of '{}' has undeclared placeholder '{{{}}}'",
            capability.endpoint,
            capability.name,
            slot
        );
        let param = ParameterDefinition::new(slot, "string")
            .with_description("Undeclared path parameter")
            .required();
        missing.push(MissingParameter::from_definition(
            &param,
            MissingSource::UserInput,
            None,
        ));
    }

    missing.sort_by(|a, b| a.name.cmp(&b.name));

    BoundRequest { url, body, missing }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::ParameterDefinition;
    use serde_json::json;

    fn bindings(entries: Vec<(&str, ParameterBinding)>) -> Bindings {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(
            placeholders("/projects/{project_id}/members/{member_id}/{project_id}"),
            vec!["project_id", "member_id"]
        );
        assert!(placeholders("/api/employees/me").is_empty());
        assert!(placeholders("/api/{}/x").is_empty());
    }

    #[test]
    fn test_path_param_substituted_not_duplicated() {
        let cap = CapabilityDescriptor::new("查询项目", "GET", "/api/projects/{project_id}")
            .with_param(ParameterDefinition::new("project_id", "string").required())
            .with_param(ParameterDefinition::new("verbose", "boolean"));

        let bound = bind_template(
            &cap,
            &bindings(vec![
                ("project_id", ParameterBinding::Bound(json!("p_123"))),
                ("verbose", ParameterBinding::Bound(json!(true))),
            ]),
        );

        assert_eq!(bound.url, "/api/projects/p_123");
        assert_eq!(bound.body.len(), 1);
        assert_eq!(bound.body.get("verbose"), Some(&json!(true)));
        assert!(!bound.body.contains_key("project_id"));
        assert!(bound.missing.is_empty());
    }

    #[test]
    fn test_unbound_path_param_left_unrendered() {
        let cap = CapabilityDescriptor::new("提交请假申请", "POST", "/api/employees/{employee_id}/leave")
            .with_param(ParameterDefinition::new("employee_id", "string").required())
            .with_param(ParameterDefinition::new("start_date", "date"))
            .with_param(ParameterDefinition::new("days", "integer"));

        let bound = bind_template(
            &cap,
            &bindings(vec![
                (
                    "employee_id",
                    ParameterBinding::Missing {
                        source: MissingSource::Reference,
                        reference: Some("ref:t1.outputs.id".to_string()),
                    },
                ),
                ("start_date", ParameterBinding::user_input_missing()),
                ("days", ParameterBinding::Bound(json!(5))),
            ]),
        );

        assert_eq!(bound.url, "/api/employees/{employee_id}/leave");
        assert_eq!(bound.body.get("days"), Some(&json!(5)));
        let names: Vec<_> = bound.missing.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["employee_id", "start_date"]);
        assert_eq!(bound.missing[0].source, MissingSource::Reference);
        assert_eq!(bound.missing[0].reference.as_deref(), Some("ref:t1.outputs.id"));
        assert_eq!(bound.missing[1].source, MissingSource::UserInput);
    }

    #[test]
    fn test_non_string_path_value_rendered() {
        let cap = CapabilityDescriptor::new("查询", "GET", "/api/items/{id}")
            .with_param(ParameterDefinition::new("id", "integer"));
        let bound = bind_template(&cap, &bindings(vec![("id", ParameterBinding::Bound(json!(42)))]));
        assert_eq!(bound.url, "/api/items/42");
    }

    #[test]
    fn test_undeclared_placeholder_reported_missing() {
        let cap = CapabilityDescriptor::new("查询", "GET", "/api/{tenant}/items");
        let bound = bind_template(&cap, &Bindings::new());
        assert_eq!(bound.url, "/api/{tenant}/items");
        assert_eq!(bound.missing.len(), 1);
        assert_eq!(bound.missing[0].name, "tenant");
        assert!(bound.missing[0].required);
        assert_eq!(bound.missing[0].source, MissingSource::UserInput);
    }

    #[test]
    fn test_missing_sorted_by_name() {
        let cap = CapabilityDescriptor::new("x", "POST", "/x")
            .with_param(ParameterDefinition::new("zeta", "string"))
            .with_param(ParameterDefinition::new("alpha", "string"))
            .with_param(ParameterDefinition::new("mid", "string"));
        let bound = bind_template(&cap, &Bindings::new());
        let names: Vec<_> = bound.missing.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_substituted_value_is_not_rendered_again() {
        let cap = CapabilityDescriptor::new("x", "GET", "/a/{x}/{y}")
            .with_param(ParameterDefinition::new("x", "string"))
            .with_param(ParameterDefinition::new("y", "string"));
        let bound = bind_template(
            &cap,
            &bindings(vec![
                ("x", ParameterBinding::Bound(json!("{y}"))),
                ("y", ParameterBinding::Bound(json!("Z"))),
            ]),
        );
        assert_eq!(bound.url, "/a/{y}/Z");

        let reversed = CapabilityDescriptor::new("x", "GET", "/a/{x}/{y}")
            .with_param(ParameterDefinition::new("y", "string"))
            .with_param(ParameterDefinition::new("x", "string"));
        let bound = bind_template(
            &reversed,
            &bindings(vec![
                ("x", ParameterBinding::Bound(json!("{y}"))),
                ("y", ParameterBinding::Bound(json!("Z"))),
            ]),
        );
        assert_eq!(bound.url, "/a/{y}/Z");
    }

    #[test]
    fn test_repeated_declaration_reported_once() {
        let cap = CapabilityDescriptor::new("x", "POST", "/x/{a}")
            .with_param(ParameterDefinition::new("a", "string"))
            .with_param(ParameterDefinition::new("b", "string"))
            .with_param(ParameterDefinition::new("a", "string"));
        let bound = bind_template(&cap, &Bindings::new());
        let names: Vec<_> = bound.missing.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
