//! Blueprint compiler
//!
//! Walks a normalized plan tree and turns every task leaf into a resolved
//! call blueprint. The compiler itself is stateless; it only holds shared
//! handles to the resolver and the extractor.
//!
//! Output shaping rules:
//! - a Sequential child of a Sequential is spliced into its parent
//! - a Parallel node is emitted as a group only when more than one child
//!   produced output; a single surviving child is spliced into the parent
//! - a Parallel child of a Parallel is merged into its parent group
//! - a multi-element Sequential inside a Parallel becomes a sequential group

use async_recursion::async_recursion;
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::binding::{bind_template, classify, resolve_bindings, Classification};
use crate::capability::{CapabilityCatalog, CapabilityDescriptor};
use crate::config::{CompileSettings, CompilerConfig};
use crate::extraction::{
    ExtractionError, LlmValueExtractor, NoopExtractor, OpenAiCompatibleProvider, ValueExtractor,
};
use crate::output::{
    BlueprintNode, CompileOutput, GroupKind, TaskBlueprint, TaskError, TaskOutcome,
    WorkflowBlueprint,
};
use crate::plan::{Plan, PlanNode, TaskNode};
use crate::resolution::{
    CapabilityResolver, CatalogIndex, DashScopeReranker, ResolutionError, RetrievalResolver,
};

/// Errors raised while wiring a compiler from configuration
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Resolver setup failed: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Extractor setup failed: {0}")]
    Extraction(#[from] ExtractionError),
}

/// Compiles task plans into workflow blueprints.
pub struct Compiler {
    resolver: Arc<dyn CapabilityResolver>,
    extractor: Arc<dyn ValueExtractor>,
    settings: CompileSettings,
}

impl Compiler {
    pub fn new(resolver: Arc<dyn CapabilityResolver>, extractor: Arc<dyn ValueExtractor>) -> Self {
        Self {
            resolver,
            extractor,
            settings: CompileSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: CompileSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Build the standard pipeline over a loaded catalog.
    ///
    /// Reranking is used only when enabled and a rerank key is configured;
    /// LLM extraction only when an LLM key is configured. Otherwise the
    /// compiler falls back to recall scores and [`NoopExtractor`].
    pub fn from_config(
        config: &CompilerConfig,
        catalog: Arc<CapabilityCatalog>,
    ) -> Result<Self, SetupError> {
        let index = Arc::new(CatalogIndex::new(catalog));
        let mut resolver = RetrievalResolver::new(index).with_config(config.retrieval.clone());

        if config.retrieval.enable_reranking && config.rerank.api_key.is_some() {
            let reranker = DashScopeReranker::new(config.rerank.clone())?;
            resolver = resolver.with_reranker(Arc::new(reranker));
        } else {
            log::info!("Reranker not configured, ranking by recall score");
        }

        let extractor: Arc<dyn ValueExtractor> = if config.llm.api_key.is_some() {
            let provider = OpenAiCompatibleProvider::new(config.llm.clone())?;
            Arc::new(
                LlmValueExtractor::new(Arc::new(provider))
                    .with_sentinel(config.compiler.missing_sentinel.clone()),
            )
        } else {
            log::info!("No LLM API key configured, value extraction disabled");
            Arc::new(NoopExtractor)
        };

        Ok(Self::new(Arc::new(resolver), extractor).with_settings(config.compiler.clone()))
    }

    /// Compile a raw plan document against the original request text.
    ///
    /// The plan shape is validated before any resolver or extractor call.
    pub async fn compile(&self, plan: &Value, query: &str) -> CompileOutput {
        let plan = match Plan::from_value(plan) {
            Ok(plan) => plan,
            Err(e) => {
                log::warn!("Rejecting plan: {}", e);
                return CompileOutput::invalid_plan_shape();
            }
        };

        CompileOutput::Workflow {
            workflow: self.compile_plan(&plan, query).await,
        }
    }

    /// Compile an already validated plan.
    pub async fn compile_plan(&self, plan: &Plan, query: &str) -> WorkflowBlueprint {
        log::info!("Compiling plan with {} tasks", plan.root.task_count());
        WorkflowBlueprint::sequential(self.compile_node(&plan.root, query).await)
    }

    /// Resolve one capability straight from the request text and bind all of
    /// its parameters from that text.
    pub async fn compile_call(&self, query: &str) -> TaskOutcome {
        let capability = match self.resolver.resolve_best(query).await {
            Ok(scored) => scored.capability,
            Err(e) => {
                log::warn!("No capability for request '{}': {}", query, e);
                return TaskOutcome::Failed(TaskError::capability_not_found(query));
            }
        };

        let classification = classify(&capability, &TaskNode::new(capability.name.clone()));
        TaskOutcome::Compiled(self.assemble(&capability, &classification, query).await)
    }

    /// Compile a subtree into the elements it contributes to its parent.
    #[async_recursion]
    async fn compile_node(&self, node: &PlanNode, query: &str) -> Vec<BlueprintNode> {
        match node {
            PlanNode::Task(task) => vec![BlueprintNode::Task(self.compile_task(task, query).await)],
            PlanNode::Sequential(children) => {
                let mut out = Vec::new();
                for child in children {
                    out.extend(self.compile_node(child, query).await);
                }
                out
            }
            PlanNode::Parallel(children) => {
                let compiled =
                    join_all(children.iter().map(|child| self.compile_node(child, query))).await;

                let mut survivors: Vec<(&PlanNode, Vec<BlueprintNode>)> = children
                    .iter()
                    .zip(compiled)
                    .filter(|(_, elements)| !elements.is_empty())
                    .collect();

                if survivors.len() == 1 {
                    return survivors.pop().map(|(_, e)| e).unwrap_or_default();
                }

                let mut members = Vec::new();
                for (child, mut elements) in survivors {
                    match (child, elements.len()) {
                        (PlanNode::Parallel(_), 1) => match elements.remove(0) {
                            BlueprintNode::Group {
                                kind: GroupKind::Parallel,
                                tasks,
                            } => members.extend(tasks),
                            other => members.push(other),
                        },
                        (_, 1) => members.extend(elements),
                        _ => members.push(BlueprintNode::Group {
                            kind: GroupKind::Sequential,
                            tasks: elements,
                        }),
                    }
                }

                if members.is_empty() {
                    vec![]
                } else {
                    vec![BlueprintNode::Group {
                        kind: GroupKind::Parallel,
                        tasks: members,
                    }]
                }
            }
        }
    }

    async fn compile_task(&self, task: &TaskNode, query: &str) -> TaskOutcome {
        let scored = match self.resolver.resolve_best(&task.capability).await {
            Ok(scored) => scored,
            Err(e) => {
                log::warn!(
                    "Task '{}': capability '{}' not resolved via {}: {}",
                    task.label(),
                    task.capability,
                    self.resolver.name(),
                    e
                );
                return TaskOutcome::Failed(TaskError::capability_not_found(&task.capability));
            }
        };

        log::debug!(
            "Task '{}' resolved to '{}' (relevance {:.3})",
            task.label(),
            scored.capability.name,
            scored.relevance
        );

        let classification = classify(&scored.capability, task);
        TaskOutcome::Compiled(
            self.assemble(&scored.capability, &classification, query)
                .await,
        )
    }

    async fn assemble(
        &self,
        capability: &CapabilityDescriptor,
        classification: &Classification,
        query: &str,
    ) -> TaskBlueprint {
        let extracted = if classification.needs_extraction.is_empty() {
            log::debug!("'{}': nothing to extract", capability.name);
            None
        } else {
            match self
                .extractor
                .extract(&classification.needs_extraction, capability, query)
                .await
            {
                Ok(values) => Some(values),
                Err(e) => {
                    log::warn!(
                        "Extraction via {} failed for '{}', marking {} parameters missing: {}",
                        self.extractor.name(),
                        capability.name,
                        classification.needs_extraction.len(),
                        e
                    );
                    None
                }
            }
        };

        let bindings = resolve_bindings(
            capability,
            classification,
            extracted.as_ref(),
            &self.settings.missing_sentinel,
        );
        let bound = bind_template(capability, &bindings);

        let description = if capability.description.is_empty() {
            capability.name.clone()
        } else {
            capability.description.clone()
        };

        TaskBlueprint {
            description,
            method: capability.method.clone(),
            url: bound.url,
            body: (!bound.body.is_empty()).then_some(bound.body),
            missing: (!bound.missing.is_empty()).then_some(bound.missing),
        }
    }
}
