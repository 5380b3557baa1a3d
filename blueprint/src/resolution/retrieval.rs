//! Two-stage retrieval: candidate recall, then relevance reranking.

use async_trait::async_trait;
use std::sync::Arc;

use super::{sort_by_relevance, CapabilityResolver, ResolutionError, ScoredCapability};
use crate::capability::CapabilityDescriptor;
use crate::config::RetrievalConfig;

/// First stage: recall candidates by similarity distance (smaller is better).
#[async_trait]
pub trait CandidateRecall: Send + Sync {
    async fn recall(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<(CapabilityDescriptor, f64)>, ResolutionError>;
}

/// Second stage: score recalled candidates by relevance (larger is better).
#[async_trait]
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;

    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<CapabilityDescriptor>,
        top_k: usize,
    ) -> Result<Vec<ScoredCapability>, ResolutionError>;
}

/// Resolver backed by recall + optional rerank.
pub struct RetrievalResolver {
    recall: Arc<dyn CandidateRecall>,
    reranker: Option<Arc<dyn Reranker>>,
    config: RetrievalConfig,
}

impl RetrievalResolver {
    pub fn new(recall: Arc<dyn CandidateRecall>) -> Self {
        Self {
            recall,
            reranker: None,
            config: RetrievalConfig::default(),
        }
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn with_config(mut self, config: RetrievalConfig) -> Self {
        self.config = config;
        self
    }

    fn active_reranker(&self) -> Option<&Arc<dyn Reranker>> {
        if self.config.enable_reranking {
            self.reranker.as_ref()
        } else {
            None
        }
    }
}

#[async_trait]
impl CapabilityResolver for RetrievalResolver {
    fn name(&self) -> &str {
        "retrieval"
    }

    async fn resolve(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredCapability>, ResolutionError> {
        let recall_k = self.config.vector_k.max(k);
        let recalled = self.recall.recall(query, recall_k).await?;
        log::debug!("Recalled {} candidates for '{}'", recalled.len(), query);

        if recalled.is_empty() {
            return Ok(vec![]);
        }

        let mut results = match self.active_reranker() {
            Some(reranker) => {
                let docs = recalled.into_iter().map(|(cap, _)| cap).collect();
                let top_n = self.config.final_k.max(k);
                let reranked = reranker.rerank(query, docs, top_n).await?;
                log::debug!(
                    "Reranker '{}' returned {} results",
                    reranker.name(),
                    reranked.len()
                );
                reranked
            }
            None => {
                log::debug!("Reranking disabled, converting recall distance to relevance");
                recalled
                    .into_iter()
                    .map(|(capability, distance)| ScoredCapability {
                        capability,
                        relevance: 1.0 - distance,
                    })
                    .collect()
            }
        };

        sort_by_relevance(&mut results);
        if let Some(floor) = self.config.min_relevance {
            results.retain(|r| r.relevance >= floor);
        }
        results.truncate(k);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedRecall {
        candidates: Vec<(CapabilityDescriptor, f64)>,
    }

    #[async_trait]
    impl CandidateRecall for FixedRecall {
        async fn recall(
            &self,
            _query: &str,
            k: usize,
        ) -> Result<Vec<(CapabilityDescriptor, f64)>, ResolutionError> {
            Ok(self.candidates.iter().take(k).cloned().collect())
        }
    }

    /// Reverses recall order to prove rerank scores win.
    struct ReversingReranker {
        calls: AtomicUsize,
        last_top_k: AtomicUsize,
    }

    impl ReversingReranker {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                last_top_k: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Reranker for ReversingReranker {
        fn name(&self) -> &str {
            "reversing"
        }

        async fn rerank(
            &self,
            _query: &str,
            candidates: Vec<CapabilityDescriptor>,
            top_k: usize,
        ) -> Result<Vec<ScoredCapability>, ResolutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.last_top_k.store(top_k, Ordering::SeqCst);
            let n = candidates.len();
            Ok(candidates
                .into_iter()
                .enumerate()
                .map(|(i, capability)| ScoredCapability {
                    capability,
                    relevance: (i + 1) as f64 / n as f64,
                })
                .rev()
                .take(top_k)
                .collect())
        }
    }

    struct FailingReranker;

    #[async_trait]
    impl Reranker for FailingReranker {
        fn name(&self) -> &str {
            "failing"
        }

        async fn rerank(
            &self,
            _query: &str,
            _candidates: Vec<CapabilityDescriptor>,
            _top_k: usize,
        ) -> Result<Vec<ScoredCapability>, ResolutionError> {
            Err(ResolutionError::Rerank("service unavailable".to_string()))
        }
    }

    fn recall() -> Arc<FixedRecall> {
        Arc::new(FixedRecall {
            candidates: vec![
                (CapabilityDescriptor::new("提交请假申请", "POST", "/leave"), 0.1),
                (CapabilityDescriptor::new("提交加班申请", "POST", "/overtime"), 0.4),
                (CapabilityDescriptor::new("获取员工项目信息", "GET", "/me"), 0.7),
            ],
        })
    }

    #[tokio::test]
    async fn test_distance_converted_to_relevance_without_reranker() {
        let resolver = RetrievalResolver::new(recall());
        let results = resolver.resolve("请假", 2).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].capability.name, "提交请假申请");
        assert!((results[0].relevance - 0.9).abs() < 1e-9);
        assert!((results[1].relevance - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_reranker_scores_win() {
        let reranker = Arc::new(ReversingReranker::new());
        let resolver = RetrievalResolver::new(recall()).with_reranker(reranker.clone());

        let best = resolver.resolve_best("请假").await.unwrap();
        assert_eq!(best.capability.name, "获取员工项目信息");
        assert_eq!(reranker.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disabled_reranking_skips_reranker() {
        let reranker = Arc::new(ReversingReranker::new());
        let config = RetrievalConfig {
            enable_reranking: false,
            ..RetrievalConfig::default()
        };
        let resolver = RetrievalResolver::new(recall())
            .with_reranker(reranker.clone())
            .with_config(config);

        let best = resolver.resolve_best("请假").await.unwrap();
        assert_eq!(best.capability.name, "提交请假申请");
        assert_eq!(reranker.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rerank_failure_is_an_error() {
        let resolver = RetrievalResolver::new(recall()).with_reranker(Arc::new(FailingReranker));
        let err = resolver.resolve("请假", 1).await.unwrap_err();
        assert!(matches!(err, ResolutionError::Rerank(_)));
    }

    #[tokio::test]
    async fn test_min_relevance_floor() {
        let config = RetrievalConfig {
            min_relevance: Some(0.95),
            ..RetrievalConfig::default()
        };
        let resolver = RetrievalResolver::new(recall()).with_config(config);
        let err = resolver.resolve_best("请假").await.unwrap_err();
        assert!(matches!(err, ResolutionError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_final_k_sizes_rerank_request() {
        let reranker = Arc::new(ReversingReranker::new());
        let config = RetrievalConfig {
            final_k: 2,
            ..RetrievalConfig::default()
        };
        let resolver = RetrievalResolver::new(recall())
            .with_reranker(reranker.clone())
            .with_config(config);

        let results = resolver.resolve("请假", 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(reranker.last_top_k.load(Ordering::SeqCst), 2);

        let wider = resolver.resolve("请假", 3).await.unwrap();
        assert_eq!(wider.len(), 3);
        assert_eq!(reranker.last_top_k.load(Ordering::SeqCst), 3);
    }
}
