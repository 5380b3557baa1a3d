//! Capability descriptors and the API definition catalog
//!
//! A capability is a named external operation: HTTP method, endpoint template
//! with `{name}` placeholders, and an ordered list of declared parameters.
//! Descriptors are immutable once loaded; the resolver hands out clones.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading a capability catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid catalog JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Duplicate capability name in catalog: {0}")]
    DuplicateName(String),

    #[error("Capability '{capability}' declares parameter '{param}' more than once")]
    DuplicateParameter { capability: String, param: String },
}

/// A single declared parameter of a capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub name: String,
    /// Semantic type tag (string, integer, date, ...)
    #[serde(rename = "type", default = "default_param_type")]
    pub param_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

fn default_param_type() -> String {
    "string".to_string()
}

impl ParameterDefinition {
    pub fn new(name: impl Into<String>, param_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: String::new(),
            required: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Declared interface of an external operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_method")]
    pub method: String,
    /// Endpoint template, e.g. `/api/employees/{employee_id}/leave`
    #[serde(default)]
    pub endpoint: String,
    #[serde(default, alias = "parameters")]
    pub params: Vec<ParameterDefinition>,
    /// Expected response shape; only used for documentation rendering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl CapabilityDescriptor {
    pub fn new(
        name: impl Into<String>,
        method: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            method: method.into(),
            endpoint: endpoint.into(),
            params: vec![],
            response: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_param(mut self, param: ParameterDefinition) -> Self {
        self.params.push(param);
        self
    }

    /// Placeholder names in the endpoint template, in order of appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        crate::binding::template::placeholders(&self.endpoint)
    }

    /// Render the descriptor as the markdown document used for indexing.
    pub fn render_document(&self) -> String {
        let params = if self.params.is_empty() {
            "无".to_string()
        } else {
            self.params
                .iter()
                .map(|p| {
                    format!(
                        "- **`{}`** (类型: {}, {}): {}",
                        p.name,
                        p.param_type,
                        if p.required { "必需" } else { "可选" },
                        p.description
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        };
        let response = self
            .response
            .as_ref()
            .and_then(|r| serde_json::to_string_pretty(r).ok())
            .unwrap_or_else(|| "{}".to_string());

        format!(
            "### API名称: {}\n\n**功能描述:**\n{}\n\n**请求详情:**\n- **方法:** `{}`\n- **路径:** `{}`\n\n**参数列表:**\n{}\n\n**预期响应:**\n{}\n",
            self.name, self.description, self.method, self.endpoint, params, response
        )
    }
}

/// In-memory collection of capability descriptors, in file order.
#[derive(Debug, Clone, Default)]
pub struct CapabilityCatalog {
    capabilities: Vec<CapabilityDescriptor>,
}

impl CapabilityCatalog {
    pub fn new(capabilities: Vec<CapabilityDescriptor>) -> Result<Self, CatalogError> {
        let mut seen = std::collections::HashSet::new();
        for cap in &capabilities {
            if !seen.insert(cap.name.as_str()) {
                return Err(CatalogError::DuplicateName(cap.name.clone()));
            }
            let mut params = std::collections::HashSet::new();
            if let Some(dup) = cap.params.iter().find(|p| !params.insert(p.name.as_str())) {
                return Err(CatalogError::DuplicateParameter {
                    capability: cap.name.clone(),
                    param: dup.name.clone(),
                });
            }
        }
        Ok(Self { capabilities })
    }

    /// Parse an API definition file: a JSON array of descriptors.
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let capabilities: Vec<CapabilityDescriptor> = serde_json::from_str(json)?;
        Self::new(capabilities)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let catalog = Self::from_json_str(&content)?;
        log::info!(
            "Loaded {} capabilities from {}",
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    pub fn get(&self, name: &str) -> Option<&CapabilityDescriptor> {
        self.capabilities.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CapabilityDescriptor> {
        self.capabilities.iter()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}
