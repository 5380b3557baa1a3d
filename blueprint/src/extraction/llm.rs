//! LLM-backed value extraction
//!
//! The prompt lists only the parameters that need values; parameters bound to
//! upstream outputs never reach the model.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::{ExtractedValues, ExtractionError, LlmProvider, ValueExtractor, MISSING_SENTINEL};
use crate::capability::{CapabilityDescriptor, ParameterDefinition};

/// Extractor that asks an LLM to fill parameters from the request text.
pub struct LlmValueExtractor {
    provider: Arc<dyn LlmProvider>,
    sentinel: String,
}

impl LlmValueExtractor {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            sentinel: MISSING_SENTINEL.to_string(),
        }
    }

    pub fn with_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.sentinel = sentinel.into();
        self
    }

    fn system_prompt(&self, params: &[ParameterDefinition], capability: &CapabilityDescriptor) -> String {
        let param_list = serde_json::to_string(params).unwrap_or_else(|_| "[]".to_string());
        format!(
            "你是一个参数提取机器人。根据用户需求，为下面JSON中列出的参数寻找并提供对应的值。\
             如果找不到某个参数的值，就使用字符串 `{sentinel}` 作为它的值。\n\
             你的输出必须是一个严格的JSON对象，只包含参数名和提取到的参数值。\n\n\
             **# API:** {name} - {description}\n\n\
             **# 需要寻找值的参数列表:**\n{param_list}\n",
            sentinel = self.sentinel,
            name = capability.name,
            description = capability.description,
            param_list = param_list,
        )
    }
}

#[async_trait]
impl ValueExtractor for LlmValueExtractor {
    fn name(&self) -> &str {
        "llm"
    }

    async fn extract(
        &self,
        params: &[ParameterDefinition],
        capability: &CapabilityDescriptor,
        query: &str,
    ) -> Result<ExtractedValues, ExtractionError> {
        let system = self.system_prompt(params, capability);
        let user = format!("**# 用户原始需求:**\n{}", query);

        let response = self.provider.generate_text(&system, &user).await?;
        log::debug!("Extraction response for '{}': {}", capability.name, response);

        parse_extraction(&response)
    }
}

/// Parse the model reply into a name -> value map.
pub fn parse_extraction(response: &str) -> Result<ExtractedValues, ExtractionError> {
    let json_str = extract_json(response);
    let value: Value = serde_json::from_str(json_str).map_err(|e| {
        ExtractionError::Parse(format!(
            "Failed to parse LLM response: {}. Response was: {}",
            e, response
        ))
    })?;

    match value {
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(ExtractionError::Parse(format!(
            "Expected a JSON object, got: {}",
            other
        ))),
    }
}

/// The JSON payload of a model reply: the body of the first fenced block
/// (any info string, any case), else the outermost `{...}` span.
fn extract_json(response: &str) -> &str {
    if let Some((_, after_open)) = response.split_once("```") {
        let body = after_open.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
        if let Some((block, _)) = body.split_once("```") {
            return block.trim();
        }
    }

    match (response.find('{'), response.rfind('}')) {
        (Some(start), Some(end)) if end > start => &response[start..=end],
        _ => response.trim(),
    }
}
