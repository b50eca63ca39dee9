//! amsha-crew: Agent Framework Boundary
//!
//! Defines the contract amsha relies on from the external agent framework:
//! a name resolves to a buildable crew, and a crew invocation yields a
//! result that may carry token usage. Crew definition records (agents,
//! tasks) are parsed from YAML and validated here.

pub mod config;
pub mod crew;
pub mod registry;

pub use config::{AgentDef, CrewDef, TaskDef};
pub use crew::{Crew, CrewResult, FnCrew, TokenUsage};
pub use registry::{CrewFactory, CrewRegistry};
