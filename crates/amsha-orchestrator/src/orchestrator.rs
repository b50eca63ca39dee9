//! Pipeline orchestrator.
//!
//! Drives a named sequence of crew executions. Each step resolves its
//! inputs (static config, a referenced file, or the prior step's output),
//! builds its crew through the factory, and feeds results back into the
//! tracked execution state. Runs transition PENDING → RUNNING →
//! COMPLETED/FAILED; PAUSED is never produced here.

use amsha_core::{merge_map, object_to_map, Error, JsonMap, Result};
use amsha_crew::{CrewFactory, TokenUsage};
use amsha_runtime::{ExecutionHandle, ExecutionMode, GpuProbe, RuntimeEngine, TokenMonitor};
use amsha_state::{ExecutionStatus, StateManager};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, instrument};

use crate::pipeline::{PipelineDefinition, PipelineRepository, PipelineStep, StepInput};

/// Result of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRunResult {
    /// Id of the tracked execution state
    pub execution_id: String,

    /// Pipeline that ran
    pub pipeline: String,

    /// Output of every step, keyed by step name
    pub outputs: JsonMap,

    /// Accumulated token usage across all steps
    pub usage: TokenUsage,

    /// Human-readable usage summary
    pub usage_summary: String,
}

/// Sequences crews through the runtime, tracking state per run.
///
/// Definitions come either from direct registration or from an injected
/// [`PipelineRepository`] (a configuration store); both resolve through
/// [`Orchestrator::run`].
#[derive(Clone)]
pub struct Orchestrator {
    definitions: Arc<RwLock<HashMap<String, PipelineDefinition>>>,
    repository: Option<Arc<dyn PipelineRepository>>,
    factory: Arc<dyn CrewFactory>,
    state: StateManager,
    runtime: Arc<RuntimeEngine>,
    monitoring: bool,
    gpu_probe: Option<Arc<dyn GpuProbe>>,
}

impl Orchestrator {
    pub fn new(factory: Arc<dyn CrewFactory>, state: StateManager) -> Self {
        Self {
            definitions: Arc::new(RwLock::new(HashMap::new())),
            repository: None,
            factory,
            state,
            runtime: Arc::new(RuntimeEngine::new()),
            monitoring: true,
            gpu_probe: None,
        }
    }

    /// Resolve definitions from a configuration store as well as from
    /// direct registration.
    pub fn with_repository(mut self, repository: Arc<dyn PipelineRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn with_runtime(mut self, runtime: Arc<RuntimeEngine>) -> Self {
        self.runtime = runtime;
        self
    }

    /// Toggle per-run usage monitoring (on by default).
    pub fn with_monitoring(mut self, monitoring: bool) -> Self {
        self.monitoring = monitoring;
        self
    }

    pub fn with_gpu_probe(mut self, probe: Arc<dyn GpuProbe>) -> Self {
        self.gpu_probe = Some(probe);
        self
    }

    /// State manager tracking this orchestrator's runs.
    pub fn state(&self) -> &StateManager {
        &self.state
    }

    /// Register a pipeline definition.
    pub async fn register(&self, definition: PipelineDefinition) -> Result<()> {
        definition.validate()?;
        let mut definitions = self.definitions.write().await;
        info!(pipeline = %definition.name, "Registering pipeline");
        definitions.insert(definition.name.clone(), definition);
        Ok(())
    }

    /// Look up a definition: registered first, then the repository.
    pub async fn get_definition(&self, name: &str) -> Result<Option<PipelineDefinition>> {
        {
            let definitions = self.definitions.read().await;
            if let Some(def) = definitions.get(name) {
                return Ok(Some(def.clone()));
            }
        }
        match &self.repository {
            Some(repository) => repository.get(name).await,
            None => Ok(None),
        }
    }

    /// Run a named pipeline in the caller's task.
    pub async fn run(&self, name: &str, seed_inputs: Option<JsonMap>) -> Result<PipelineRunResult> {
        let definition = self
            .get_definition(name)
            .await?
            .ok_or_else(|| Error::not_found(format!("Unknown pipeline: {}", name)))?;
        self.run_definition(definition, seed_inputs).await
    }

    /// Run a pipeline definition in the caller's task.
    #[instrument(skip(self, definition, seed_inputs), fields(pipeline = %definition.name))]
    pub async fn run_definition(
        &self,
        definition: PipelineDefinition,
        seed_inputs: Option<JsonMap>,
    ) -> Result<PipelineRunResult> {
        definition.validate()?;
        let seed = seed_inputs.unwrap_or_default();

        let state = self.state.create_execution(Some(seed.clone())).await?;
        let execution_id = state.execution_id.clone();

        let run_metadata: JsonMap = [(
            "pipeline".to_string(),
            Value::String(definition.name.clone()),
        )]
        .into_iter()
        .collect();
        self.state
            .update_status(&execution_id, ExecutionStatus::Running, Some(run_metadata))
            .await?;

        let mut monitor = self.monitoring.then(|| {
            let mut monitor = TokenMonitor::new();
            if let Some(probe) = &self.gpu_probe {
                monitor = monitor.with_gpu_probe(Arc::clone(probe));
            }
            monitor.start_monitoring();
            monitor
        });

        info!(execution_id = %execution_id, steps = definition.steps.len(), "Starting pipeline run");

        let mut outputs = JsonMap::new();
        for step in &definition.steps {
            match self.run_step(step, &seed, &outputs, monitor.as_mut()).await {
                Ok(output) => {
                    self.state
                        .set_output(&execution_id, &step.name, output.clone())
                        .await?;
                    outputs.insert(step.name.clone(), output);
                }
                Err(e) => {
                    error!(
                        execution_id = %execution_id,
                        step = %step.name,
                        error = %e,
                        "Pipeline step failed"
                    );
                    let failure_metadata: JsonMap = [
                        ("error".to_string(), Value::String(e.to_string())),
                        ("failed_step".to_string(), Value::String(step.name.clone())),
                    ]
                    .into_iter()
                    .collect();
                    self.state
                        .update_status(&execution_id, ExecutionStatus::Failed, Some(failure_metadata))
                        .await?;
                    return Err(e);
                }
            }
        }

        let (usage, usage_summary, completion_metadata) = match monitor.as_mut() {
            Some(monitor) => {
                monitor.stop_monitoring();
                let summary = monitor.get_summary();
                let metadata: JsonMap =
                    [("performance".to_string(), monitor.metrics_json())]
                        .into_iter()
                        .collect();
                (monitor.usage(), summary, Some(metadata))
            }
            None => (TokenUsage::default(), String::new(), None),
        };

        self.state
            .update_status(&execution_id, ExecutionStatus::Completed, completion_metadata)
            .await?;

        info!(execution_id = %execution_id, "Pipeline run completed");

        Ok(PipelineRunResult {
            execution_id,
            pipeline: definition.name,
            outputs,
            usage,
            usage_summary,
        })
    }

    /// Run a named pipeline in the background, returning the handle.
    ///
    /// Failures surface when `result()` is called, not at submission time.
    pub async fn run_background(
        &self,
        name: &str,
        seed_inputs: Option<JsonMap>,
    ) -> ExecutionHandle {
        let orchestrator = self.clone();
        let pipeline = name.to_string();
        let label = format!("pipeline:{}", name);

        self.runtime
            .submit(&label, ExecutionMode::Background, async move {
                let result = orchestrator.run(&pipeline, seed_inputs).await?;
                Ok(serde_json::to_value(result)?)
            })
            .await
    }

    async fn run_step(
        &self,
        step: &PipelineStep,
        seed: &JsonMap,
        outputs: &JsonMap,
        monitor: Option<&mut TokenMonitor>,
    ) -> Result<Value> {
        let inputs = resolve_step_input(step, seed, outputs)?;
        let crew = self.factory.build(&step.crew)?;

        info!(step = %step.name, crew = %step.crew, "Kicking off crew");
        let result = crew.kickoff(inputs).await?;

        if let Some(monitor) = monitor {
            monitor.log_usage(&result);
        }
        Ok(result.output)
    }
}

/// Resolve a step's input map.
///
/// Inline values are overlaid on the seed inputs; a file must contain a
/// YAML/JSON mapping; a previous-step reference requires that step to have
/// already run. A non-mapping previous output is passed under an `input`
/// key.
fn resolve_step_input(step: &PipelineStep, seed: &JsonMap, outputs: &JsonMap) -> Result<JsonMap> {
    match &step.input {
        None => Ok(seed.clone()),
        Some(StepInput::Inline { values }) => {
            let mut inputs = seed.clone();
            merge_map(&mut inputs, values);
            Ok(inputs)
        }
        Some(StepInput::File { path }) => {
            let content = std::fs::read_to_string(path).map_err(|e| {
                Error::configuration(format!(
                    "Step '{}' input file {} is unreadable: {}",
                    step.name,
                    path.display(),
                    e
                ))
            })?;
            let value: Value = serde_yaml::from_str(&content)?;
            if !value.is_object() {
                return Err(Error::configuration(format!(
                    "Step '{}' input file {} is not a mapping",
                    step.name,
                    path.display()
                )));
            }
            Ok(object_to_map(&value))
        }
        Some(StepInput::PreviousStep { step: dep }) => match outputs.get(dep) {
            Some(output) if output.is_object() => Ok(object_to_map(output)),
            Some(output) => Ok([("input".to_string(), output.clone())].into_iter().collect()),
            None => Err(Error::configuration(format!(
                "Step '{}' requires output of step '{}' which has not run",
                step.name, dep
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::InMemoryPipelineRepository;
    use amsha_crew::{CrewRegistry, CrewResult, FnCrew};
    use amsha_state::InMemoryStateRepository;
    use serde_json::json;
    use std::io::Write;
    use std::time::Duration;

    fn registry() -> CrewRegistry {
        let registry = CrewRegistry::new();
        registry.register("greeter", || {
            Box::new(FnCrew::new("greeter", |inputs| {
                let name = inputs
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("world")
                    .to_string();
                Ok(CrewResult::new(json!({"greeting": format!("Hello {name}")}))
                    .with_usage(TokenUsage {
                        prompt_tokens: 10,
                        completion_tokens: 5,
                        total_tokens: 15,
                    }))
            }))
        });
        registry.register("shouter", || {
            Box::new(FnCrew::new("shouter", |inputs| {
                let greeting = inputs
                    .get("greeting")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_uppercase();
                Ok(CrewResult::new(json!({"shout": greeting})).with_usage(TokenUsage {
                    prompt_tokens: 4,
                    completion_tokens: 2,
                    total_tokens: 6,
                }))
            }))
        });
        registry.register("boom", || {
            Box::new(FnCrew::new("boom", |_| Err(Error::crew("model refused"))))
        });
        registry
    }

    fn orchestrator() -> Orchestrator {
        let state = StateManager::new(Arc::new(InMemoryStateRepository::new()));
        Orchestrator::new(Arc::new(registry()), state)
    }

    fn two_step_definition() -> PipelineDefinition {
        PipelineDefinition::new("greet", "Greet then shout")
            .with_step(PipelineStep {
                name: "greet".to_string(),
                crew: "greeter".to_string(),
                input: None,
            })
            .with_step(PipelineStep {
                name: "shout".to_string(),
                crew: "shouter".to_string(),
                input: Some(StepInput::PreviousStep {
                    step: "greet".to_string(),
                }),
            })
    }

    fn seed(name: &str) -> JsonMap {
        [("name".to_string(), json!(name))].into_iter().collect()
    }

    #[tokio::test]
    async fn test_run_two_step_pipeline() {
        let orch = orchestrator();
        orch.register(two_step_definition()).await.unwrap();

        let result = orch.run("greet", Some(seed("X"))).await.unwrap();
        assert_eq!(result.outputs["greet"], json!({"greeting": "Hello X"}));
        assert_eq!(result.outputs["shout"], json!({"shout": "HELLO X"}));
        assert_eq!(result.usage.total_tokens, 21);
        assert!(result.usage_summary.contains("Total Tokens: 21"));

        let state = orch
            .state()
            .get_execution(&result.execution_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.status, ExecutionStatus::Completed);
        assert_eq!(state.inputs, seed("X"));
        assert_eq!(state.outputs.len(), 2);
        // Running + Completed
        assert_eq!(state.history.len(), 2);
        assert!(state.metadata.contains_key("performance"));
        assert_eq!(state.metadata.get("pipeline"), Some(&json!("greet")));
    }

    #[tokio::test]
    async fn test_unknown_pipeline_is_not_found() {
        let orch = orchestrator();
        let err = orch.run("missing", None).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unresolved_previous_step_names_dependency() {
        let orch = orchestrator();
        let def = PipelineDefinition::new("broken", "").with_step(PipelineStep {
            name: "B".to_string(),
            crew: "shouter".to_string(),
            input: Some(StepInput::PreviousStep {
                step: "A".to_string(),
            }),
        });

        let err = orch.run_definition(def, None).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("'A'"));
    }

    #[tokio::test]
    async fn test_failing_crew_marks_state_failed_and_propagates() {
        let orch = orchestrator();
        let def = PipelineDefinition::new("explode", "").with_step(PipelineStep {
            name: "detonate".to_string(),
            crew: "boom".to_string(),
            input: None,
        });

        let err = orch.run_definition(def, None).await.unwrap_err();
        assert!(matches!(err, Error::Crew(_)));

        let states = orch.state().list_executions().await.unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].status, ExecutionStatus::Failed);
        assert_eq!(states[0].metadata.get("failed_step"), Some(&json!("detonate")));
        assert!(states[0]
            .metadata
            .get("error")
            .and_then(Value::as_str)
            .unwrap()
            .contains("model refused"));
    }

    #[tokio::test]
    async fn test_unknown_crew_fails_run() {
        let orch = orchestrator();
        let def = PipelineDefinition::new("ghost", "").with_step(PipelineStep {
            name: "step".to_string(),
            crew: "unregistered".to_string(),
            input: None,
        });

        let err = orch.run_definition(def, None).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let states = orch.state().list_executions().await.unwrap();
        assert_eq!(states[0].status, ExecutionStatus::Failed);
    }

    #[tokio::test]
    async fn test_repository_backed_resolution() {
        let repository = Arc::new(InMemoryPipelineRepository::new());
        repository.save(&two_step_definition()).await.unwrap();

        let state = StateManager::new(Arc::new(InMemoryStateRepository::new()));
        let orch = Orchestrator::new(Arc::new(registry()), state)
            .with_repository(repository);

        let result = orch.run("greet", Some(seed("Y"))).await.unwrap();
        assert_eq!(result.outputs["shout"], json!({"shout": "HELLO Y"}));
    }

    #[tokio::test]
    async fn test_inline_values_overlay_seed() {
        let orch = orchestrator();
        let inline: JsonMap = [("name".to_string(), json!("Override"))].into_iter().collect();
        let def = PipelineDefinition::new("inline", "").with_step(PipelineStep {
            name: "greet".to_string(),
            crew: "greeter".to_string(),
            input: Some(StepInput::Inline { values: inline }),
        });

        let result = orch.run_definition(def, Some(seed("Seed"))).await.unwrap();
        assert_eq!(result.outputs["greet"], json!({"greeting": "Hello Override"}));
    }

    #[tokio::test]
    async fn test_file_input() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name: FromFile").unwrap();

        let orch = orchestrator();
        let def = PipelineDefinition::new("filed", "").with_step(PipelineStep {
            name: "greet".to_string(),
            crew: "greeter".to_string(),
            input: Some(StepInput::File {
                path: file.path().to_path_buf(),
            }),
        });

        let result = orch.run_definition(def, None).await.unwrap();
        assert_eq!(result.outputs["greet"], json!({"greeting": "Hello FromFile"}));
    }

    #[tokio::test]
    async fn test_missing_file_is_configuration_error() {
        let orch = orchestrator();
        let def = PipelineDefinition::new("filed", "").with_step(PipelineStep {
            name: "greet".to_string(),
            crew: "greeter".to_string(),
            input: Some(StepInput::File {
                path: "/nonexistent/inputs.yaml".into(),
            }),
        });

        let err = orch.run_definition(def, None).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_run_background_surfaces_result_at_handle() {
        let orch = orchestrator();
        orch.register(two_step_definition()).await.unwrap();

        let mut handle = orch.run_background("greet", Some(seed("Z"))).await;
        let value = handle.result(Some(Duration::from_secs(5))).await.unwrap();
        let result: PipelineRunResult = serde_json::from_value(value).unwrap();
        assert_eq!(result.outputs["shout"], json!({"shout": "HELLO Z"}));
    }

    #[tokio::test]
    async fn test_run_background_error_surfaces_at_result() {
        let orch = orchestrator();
        let mut handle = orch.run_background("missing", None).await;
        let err = handle.result(Some(Duration::from_secs(5))).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_monitoring_disabled_omits_performance_metadata() {
        let orch = orchestrator().with_monitoring(false);
        orch.register(two_step_definition()).await.unwrap();

        let result = orch.run("greet", Some(seed("X"))).await.unwrap();
        assert_eq!(result.usage.total_tokens, 0);

        let state = orch
            .state()
            .get_execution(&result.execution_id)
            .await
            .unwrap()
            .unwrap();
        assert!(!state.metadata.contains_key("performance"));
    }

    #[test]
    fn test_resolve_previous_step_wraps_scalar_output() {
        let step = PipelineStep {
            name: "b".to_string(),
            crew: "c".to_string(),
            input: Some(StepInput::PreviousStep {
                step: "a".to_string(),
            }),
        };
        let outputs: JsonMap = [("a".to_string(), json!("plain text"))].into_iter().collect();
        let inputs = resolve_step_input(&step, &JsonMap::new(), &outputs).unwrap();
        assert_eq!(inputs.get("input"), Some(&json!("plain text")));
    }
}
