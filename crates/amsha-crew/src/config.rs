//! Crew definition records.
//!
//! Crews are described in YAML: a list of agents, the tasks they perform,
//! and crew-level settings. The external agent framework consumes these
//! records to build invocable crews; amsha only parses and validates them.

use amsha_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// One agent within a crew.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentDef {
    pub name: String,
    pub role: String,
    pub goal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backstory: Option<String>,
    /// LLM identifier, framework-specific
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<String>,
}

/// One task within a crew, assigned to an agent by name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskDef {
    pub name: String,
    pub description: String,
    pub agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
}

/// A complete crew definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrewDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub agents: Vec<AgentDef>,
    pub tasks: Vec<TaskDef>,
    /// Execution process, framework-specific (e.g. "sequential")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<String>,
}

impl CrewDef {
    /// Parse a definition from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let def: CrewDef = serde_yaml::from_str(yaml)?;
        def.validate()?;
        Ok(def)
    }

    /// Load and validate a definition from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Validate internal references.
    pub fn validate(&self) -> Result<()> {
        let mut agent_names = HashSet::new();
        for agent in &self.agents {
            if !agent_names.insert(agent.name.as_str()) {
                return Err(Error::configuration(format!(
                    "Crew '{}' has duplicate agent name: {}",
                    self.name, agent.name
                )));
            }
        }

        let mut task_names = HashSet::new();
        for task in &self.tasks {
            if !task_names.insert(task.name.as_str()) {
                return Err(Error::configuration(format!(
                    "Crew '{}' has duplicate task name: {}",
                    self.name, task.name
                )));
            }
            if !agent_names.contains(task.agent.as_str()) {
                return Err(Error::configuration(format!(
                    "Task '{}' references unknown agent: {}",
                    task.name, task.agent
                )));
            }
        }

        Ok(())
    }
}
