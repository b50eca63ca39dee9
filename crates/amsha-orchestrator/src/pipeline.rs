//! Pipeline definitions.
//!
//! A pipeline is an ordered sequence of crew invocations with inter-step
//! data dependencies. Definitions are serializable and usually live in
//! YAML files or a configuration store.

use amsha_core::{Error, JsonMap, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Where a step takes its inputs from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum StepInput {
    /// Static values from the definition, overlaid on the seed inputs
    Inline {
        #[serde(default)]
        values: JsonMap,
    },

    /// A YAML/JSON mapping read from a file at run time
    File { path: PathBuf },

    /// The output of an earlier step in the same run
    PreviousStep { step: String },
}

/// One step of a pipeline: a crew to invoke and where its inputs come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineStep {
    /// Step name (unique within the pipeline)
    pub name: String,

    /// Crew to build and kick off
    pub crew: String,

    /// Input source; absent means the run's seed inputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<StepInput>,
}

/// A named, ordered sequence of steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineDefinition {
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub steps: Vec<PipelineStep>,

    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl PipelineDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            steps: Vec::new(),
            version: default_version(),
        }
    }

    /// Append a step.
    pub fn with_step(mut self, step: PipelineStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Parse a definition from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let def: PipelineDefinition = serde_yaml::from_str(yaml)?;
        Ok(def)
    }

    /// Load a definition from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Validate the definition.
    ///
    /// Step names must be unique, and a `previous_step` input must
    /// reference a step declared earlier in the sequence.
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(Error::configuration(format!(
                "Pipeline '{}' has no steps",
                self.name
            )));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for step in &self.steps {
            if let Some(StepInput::PreviousStep { step: dep }) = &step.input {
                if !seen.contains(dep.as_str()) {
                    return Err(Error::configuration(format!(
                        "Step '{}' requires output of step '{}' which has not run",
                        step.name, dep
                    )));
                }
            }
            if !seen.insert(step.name.as_str()) {
                return Err(Error::configuration(format!(
                    "Pipeline '{}' has duplicate step name: {}",
                    self.name, step.name
                )));
            }
        }

        Ok(())
    }
}

/// Configuration store capability for pipeline definitions.
///
/// Any document store satisfying this contract is pluggable.
#[async_trait]
pub trait PipelineRepository: Send + Sync {
    async fn save(&self, definition: &PipelineDefinition) -> Result<()>;
    async fn get(&self, name: &str) -> Result<Option<PipelineDefinition>>;
    async fn list(&self) -> Result<Vec<String>>;
}

/// In-memory pipeline store.
#[derive(Clone, Default)]
pub struct InMemoryPipelineRepository {
    definitions: Arc<RwLock<HashMap<String, PipelineDefinition>>>,
}

impl InMemoryPipelineRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PipelineRepository for InMemoryPipelineRepository {
    async fn save(&self, definition: &PipelineDefinition) -> Result<()> {
        definition.validate()?;
        let mut definitions = self.definitions.write().await;
        definitions.insert(definition.name.clone(), definition.clone());
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<PipelineDefinition>> {
        let definitions = self.definitions.read().await;
        Ok(definitions.get(name).cloned())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let definitions = self.definitions.read().await;
        let mut names: Vec<_> = definitions.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
