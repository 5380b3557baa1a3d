// Workflow blueprint compiler
// Turns staged or tree-shaped API task plans into resolved call blueprints

pub mod binding;
pub mod capability;
pub mod compiler;
pub mod config;
pub mod extraction;
pub mod output;
pub mod plan;
pub mod resolution;
#[cfg(feature = "server")]
pub mod server;

pub use capability::{CapabilityCatalog, CapabilityDescriptor, ParameterDefinition};
pub use compiler::{Compiler, SetupError};
pub use config::CompilerConfig;
pub use extraction::{NoopExtractor, ValueExtractor};
pub use output::{CompileOutput, TaskBlueprint, TaskOutcome, WorkflowBlueprint};
pub use plan::{Plan, PlanNode, PlanShapeError, TaskNode};
pub use resolution::{CapabilityResolver, ResolutionError, ScoredCapability};
