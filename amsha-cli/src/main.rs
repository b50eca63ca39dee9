//! amsha: pipeline runner CLI
//!
//! Validates crew/pipeline definition files and runs pipelines against
//! dry-run echo crews, with a selectable state store.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use amsha_core::config::{get_config_opt, load_environment};
use amsha_core::JsonMap;
use amsha_crew::{CrewDef, CrewRegistry, CrewResult, FnCrew};
use amsha_orchestrator::{Orchestrator, PipelineDefinition};
use amsha_state::{InMemoryStateRepository, SqliteStateRepository, StateManager, StateRepository};

#[derive(Parser, Debug)]
#[command(name = "amsha")]
#[command(about = "Run and validate amsha crew pipelines")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate pipeline and crew definition files
    Validate {
        /// Pipeline YAML file
        #[arg(long)]
        pipeline: Option<PathBuf>,

        /// Crew YAML files
        #[arg(long = "crew")]
        crews: Vec<PathBuf>,
    },

    /// Run a pipeline against dry-run crews that echo their inputs
    Run {
        /// Pipeline YAML file
        pipeline: PathBuf,

        /// Seed inputs as key=value pairs (values parsed as JSON when possible)
        #[arg(short, long = "input")]
        inputs: Vec<String>,

        /// State store: "memory" or a sqlite URL (default from AMSHA_STORE)
        #[arg(long)]
        store: Option<String>,

        /// Disable usage monitoring
        #[arg(long)]
        no_monitor: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    load_environment();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    match args.command {
        Commands::Validate { pipeline, crews } => validate(pipeline, crews),
        Commands::Run {
            pipeline,
            inputs,
            store,
            no_monitor,
        } => run(pipeline, inputs, store, no_monitor).await,
    }
}

fn validate(pipeline: Option<PathBuf>, crews: Vec<PathBuf>) -> Result<()> {
    if let Some(path) = pipeline {
        let def = PipelineDefinition::from_file(&path)
            .with_context(|| format!("reading pipeline {}", path.display()))?;
        def.validate()?;
        println!("pipeline '{}': ok ({} steps)", def.name, def.steps.len());
    }

    for path in crews {
        let def = CrewDef::from_file(&path)
            .with_context(|| format!("reading crew {}", path.display()))?;
        println!(
            "crew '{}': ok ({} agents, {} tasks)",
            def.name,
            def.agents.len(),
            def.tasks.len()
        );
    }

    Ok(())
}

async fn run(
    pipeline: PathBuf,
    inputs: Vec<String>,
    store: Option<String>,
    no_monitor: bool,
) -> Result<()> {
    let definition = PipelineDefinition::from_file(&pipeline)
        .with_context(|| format!("reading pipeline {}", pipeline.display()))?;
    definition.validate()?;

    let seed = parse_input_pairs(&inputs)?;

    let store = store
        .or_else(|| get_config_opt("AMSHA_STORE"))
        .unwrap_or_else(|| "memory".to_string());
    let repository: Arc<dyn StateRepository> = if store == "memory" {
        Arc::new(InMemoryStateRepository::new())
    } else {
        Arc::new(SqliteStateRepository::new(&store).await?)
    };
    info!(store = %store, pipeline = %definition.name, "Starting dry run");

    // Dry runs echo each step's resolved inputs back as its output.
    let registry = CrewRegistry::new();
    for step in &definition.steps {
        let crew_name = step.crew.clone();
        if registry.contains(&crew_name) {
            continue;
        }
        registry.register(crew_name.clone(), move || {
            Box::new(FnCrew::new(crew_name.clone(), |inputs| {
                Ok(CrewResult::new(amsha_core::map_to_object(&inputs)))
            }))
        });
    }

    let state = StateManager::new(repository);
    let orchestrator = Orchestrator::new(Arc::new(registry), state)
        .with_monitoring(!no_monitor);

    let name = definition.name.clone();
    orchestrator.register(definition).await?;
    let result = orchestrator.run(&name, Some(seed)).await?;

    println!("execution: {}", result.execution_id);
    println!("{}", serde_json::to_string_pretty(&result.outputs)?);
    if !result.usage_summary.is_empty() {
        println!("\n{}", result.usage_summary);
    }

    Ok(())
}

/// Parse `key=value` pairs; values that parse as JSON are kept typed,
/// anything else becomes a string.
fn parse_input_pairs(pairs: &[String]) -> Result<JsonMap> {
    let mut map = JsonMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("input '{}' is not key=value", pair))?;
        let parsed = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        map.insert(key.to_string(), parsed);
    }
    Ok(map)
}
