//! Capability resolution
//!
//! The compiler only sees [`CapabilityResolver`]: give it a capability name
//! or free-text query, get back scored descriptors, best first. Scores are
//! always relevance (higher is better). How candidates are recalled and
//! reranked is the resolver's business; see [`retrieval::RetrievalResolver`]
//! for the two-stage pipeline.

pub mod catalog;
pub mod rerank;
pub mod retrieval;

pub use catalog::CatalogIndex;
pub use rerank::DashScopeReranker;
pub use retrieval::{CandidateRecall, Reranker, RetrievalResolver};

use async_trait::async_trait;
use thiserror::Error;

use crate::capability::CapabilityDescriptor;

/// Error type for resolution failures
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("No capability found for: {0}")]
    NotFound(String),

    #[error("Candidate recall failed: {0}")]
    Recall(String),

    #[error("Rerank failed: {0}")]
    Rerank(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Failed to parse resolver response: {0}")]
    Parse(String),
}

/// A capability together with its relevance to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCapability {
    pub capability: CapabilityDescriptor,
    /// Higher is better
    pub relevance: f64,
}

/// Resolves a capability name or query to its best-matching descriptors.
#[async_trait]
pub trait CapabilityResolver: Send + Sync {
    /// Name of this resolver for logging
    fn name(&self) -> &str;

    /// Return up to `k` matches ordered by descending relevance.
    async fn resolve(&self, query: &str, k: usize)
        -> Result<Vec<ScoredCapability>, ResolutionError>;

    /// The single best match, or `NotFound`.
    async fn resolve_best(&self, query: &str) -> Result<ScoredCapability, ResolutionError> {
        self.resolve(query, 1)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ResolutionError::NotFound(query.to_string()))
    }
}

/// Order by descending relevance, ties broken by capability name.
pub(crate) fn sort_by_relevance(results: &mut [ScoredCapability]) {
    results.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.capability.name.cmp(&b.capability.name))
    });
}
