//! In-process candidate recall over a loaded capability catalog.
//!
//! Scores lexically with character-bigram Sørensen–Dice similarity, so it
//! works for unsegmented text (Chinese API names) as well as English.

use async_trait::async_trait;
use std::sync::Arc;

use super::retrieval::CandidateRecall;
use super::ResolutionError;
use crate::capability::{CapabilityCatalog, CapabilityDescriptor};

/// Lexical recall index over a [`CapabilityCatalog`].
pub struct CatalogIndex {
    catalog: Arc<CapabilityCatalog>,
}

impl CatalogIndex {
    pub fn new(catalog: Arc<CapabilityCatalog>) -> Self {
        Self { catalog }
    }

    /// Distance in [0, 1]; 0 for an exact name match.
    fn distance(query: &str, capability: &CapabilityDescriptor) -> f64 {
        let query = query.trim().to_lowercase();
        let name = capability.name.to_lowercase();
        if query == name {
            return 0.0;
        }

        let by_name = strsim::sorensen_dice(&query, &name);
        let by_doc = strsim::sorensen_dice(
            &query,
            &format!("{} {}", name, capability.description.to_lowercase()),
        );
        1.0 - by_name.max(by_doc)
    }
}

#[async_trait]
impl CandidateRecall for CatalogIndex {
    async fn recall(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<(CapabilityDescriptor, f64)>, ResolutionError> {
        let mut scored: Vec<(CapabilityDescriptor, f64)> = self
            .catalog
            .iter()
            .map(|cap| (cap.clone(), Self::distance(query, cap)))
            .filter(|(_, distance)| *distance < 1.0)
            .collect();

        // Stable: equal distances keep catalog order
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}
