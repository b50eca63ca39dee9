//! Crew factory and registry.

use amsha_core::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::info;

use crate::crew::Crew;

/// Capability to build a crew by name.
pub trait CrewFactory: Send + Sync {
    /// Build the named crew. Unknown names are a `NotFound` error.
    fn build(&self, name: &str) -> Result<Box<dyn Crew>>;
}

type CrewBuilder = Arc<dyn Fn() -> Box<dyn Crew> + Send + Sync>;

/// Registry of named crew builders.
#[derive(Clone, Default)]
pub struct CrewRegistry {
    builders: Arc<RwLock<HashMap<String, CrewBuilder>>>,
}

impl CrewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a builder under `name`, replacing any previous one.
    pub fn register(
        &self,
        name: impl Into<String>,
        builder: impl Fn() -> Box<dyn Crew> + Send + Sync + 'static,
    ) {
        let name = name.into();
        info!(crew = %name, "Registering crew builder");
        let mut builders = self.builders.write().expect("registry lock poisoned");
        builders.insert(name, Arc::new(builder));
    }

    /// Names of all registered crews.
    pub fn list(&self) -> Vec<String> {
        let builders = self.builders.read().expect("registry lock poisoned");
        let mut names: Vec<_> = builders.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        let builders = self.builders.read().expect("registry lock poisoned");
        builders.contains_key(name)
    }
}

impl CrewFactory for CrewRegistry {
    fn build(&self, name: &str) -> Result<Box<dyn Crew>> {
        let builders = self.builders.read().expect("registry lock poisoned");
        match builders.get(name) {
            Some(builder) => Ok(builder()),
            None => Err(Error::not_found(format!("Unknown crew: {}", name))),
        }
    }
}
