//! Value extraction
//!
//! Fills needs-extraction parameters from the original request text. The
//! compiler treats the extractor as a potentially failing collaborator: a
//! failed call degrades every requested parameter to missing user input.

pub mod llm;
pub mod provider;

pub use llm::LlmValueExtractor;
pub use provider::{LlmProvider, OpenAiCompatibleProvider};

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

use crate::capability::{CapabilityDescriptor, ParameterDefinition};

/// Value an extractor returns when the request text holds nothing for a parameter.
pub const MISSING_SENTINEL: &str = "__MISSING__";

/// Extracted values keyed by parameter name.
pub type ExtractedValues = HashMap<String, Value>;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("LLM call failed: {0}")]
    Llm(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Failed to parse extraction output: {0}")]
    Parse(String),
}

/// Extracts parameter values from the request text.
#[async_trait]
pub trait ValueExtractor: Send + Sync {
    /// Name of this extractor for logging
    fn name(&self) -> &str;

    /// Look for values for `params` of `capability` in `query`.
    ///
    /// Parameters the extractor cannot fill may be absent from the result,
    /// null, or the missing sentinel.
    async fn extract(
        &self,
        params: &[ParameterDefinition],
        capability: &CapabilityDescriptor,
        query: &str,
    ) -> Result<ExtractedValues, ExtractionError>;
}

/// Extractor that never finds anything; every requested parameter ends up missing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopExtractor;

#[async_trait]
impl ValueExtractor for NoopExtractor {
    fn name(&self) -> &str {
        "noop"
    }

    async fn extract(
        &self,
        _params: &[ParameterDefinition],
        _capability: &CapabilityDescriptor,
        _query: &str,
    ) -> Result<ExtractedValues, ExtractionError> {
        Ok(ExtractedValues::new())
    }
}
