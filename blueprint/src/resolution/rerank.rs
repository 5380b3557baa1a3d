//! DashScope text-rerank client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::retrieval::Reranker;
use super::{ResolutionError, ScoredCapability};
use crate::capability::CapabilityDescriptor;
use crate::config::RerankConfig;

const DEFAULT_RERANK_URL: &str =
    "https://dashscope.aliyuncs.com/api/v1/services/rerank/text-rerank/text-rerank";

/// Reranks candidates by sending their rendered documents to a text-rerank service.
pub struct DashScopeReranker {
    config: RerankConfig,
    client: reqwest::Client,
}

impl DashScopeReranker {
    pub fn new(config: RerankConfig) -> Result<Self, ResolutionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ResolutionError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or(DEFAULT_RERANK_URL)
    }
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    input: RerankInput<'a>,
    parameters: RerankParameters,
}

#[derive(Serialize)]
struct RerankInput<'a> {
    query: &'a str,
    documents: Vec<String>,
}

#[derive(Serialize)]
struct RerankParameters {
    top_n: usize,
    return_documents: bool,
}

#[derive(Deserialize)]
struct RerankResponse {
    output: RerankOutput,
}

#[derive(Deserialize)]
struct RerankOutput {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f64,
}

/// Map service results back onto the candidate list, dropping out-of-range indices.
fn attach_scores(
    candidates: Vec<CapabilityDescriptor>,
    results: Vec<RerankResult>,
) -> Vec<ScoredCapability> {
    let mut slots: Vec<Option<CapabilityDescriptor>> = candidates.into_iter().map(Some).collect();
    results
        .into_iter()
        .filter_map(|r| {
            slots
                .get_mut(r.index)
                .and_then(Option::take)
                .map(|capability| ScoredCapability {
                    capability,
                    relevance: r.relevance_score,
                })
        })
        .collect()
}

#[async_trait]
impl Reranker for DashScopeReranker {
    fn name(&self) -> &str {
        "dashscope"
    }

    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<CapabilityDescriptor>,
        top_k: usize,
    ) -> Result<Vec<ScoredCapability>, ResolutionError> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| ResolutionError::Rerank("API key required for reranker".to_string()))?;

        let request = RerankRequest {
            model: &self.config.model,
            input: RerankInput {
                query,
                documents: candidates.iter().map(|c| c.render_document()).collect(),
            },
            parameters: RerankParameters {
                top_n: top_k,
                return_documents: false,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ResolutionError::Http(format!("Rerank request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ResolutionError::Rerank(format!(
                "Rerank service returned {}: {}",
                status, body
            )));
        }

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| ResolutionError::Parse(format!("Invalid rerank response: {}", e)))?;

        Ok(attach_scores(candidates, parsed.output.results))
    }
}
