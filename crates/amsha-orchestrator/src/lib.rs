//! amsha-orchestrator: Pipeline Sequencing
//!
//! Drives ordered sequences of crew executions, resolving each step's
//! inputs from static config, files, or prior step outputs, and feeding
//! results into tracked execution state.

pub mod orchestrator;
pub mod pipeline;

pub use orchestrator::{Orchestrator, PipelineRunResult};
pub use pipeline::{
    InMemoryPipelineRepository, PipelineDefinition, PipelineRepository, PipelineStep, StepInput,
};
