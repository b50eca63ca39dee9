//! Execution lifecycle facade.

use amsha_core::{JsonMap, Result};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::metrics::ExecutionMetrics;
use crate::repository::StateRepository;
use crate::state::{ExecutionState, ExecutionStatus};

/// Event emitted when execution state changes.
#[derive(Clone, Debug)]
pub enum ExecutionEvent {
    Created(ExecutionState),
    StatusUpdated(String, ExecutionStatus), // execution_id, new_status
}

/// Lifecycle facade over a [`StateRepository`].
///
/// Creates executions, applies status transitions with their audit
/// snapshots, and re-persists after every mutation. Lookups of unknown
/// execution ids return `Ok(None)`; they never create entries.
#[derive(Clone)]
pub struct StateManager {
    repository: Arc<dyn StateRepository>,
    metrics: Arc<ExecutionMetrics>,
    event_sender: broadcast::Sender<ExecutionEvent>,
}

impl StateManager {
    pub fn new(repository: Arc<dyn StateRepository>) -> Self {
        let (tx, _) = broadcast::channel(1000);
        Self {
            repository,
            metrics: Arc::new(ExecutionMetrics::default()),
            event_sender: tx,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ExecutionMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Subscribe to execution events.
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.event_sender.subscribe()
    }

    /// Metrics collector backing this manager.
    pub fn metrics(&self) -> Arc<ExecutionMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Create and persist a new execution in `Pending` status.
    #[instrument(skip(self, inputs))]
    pub async fn create_execution(&self, inputs: Option<JsonMap>) -> Result<ExecutionState> {
        let state = ExecutionState::new(inputs);
        self.repository.save(&state).await?;

        self.metrics.execution_started();
        let _ = self.event_sender.send(ExecutionEvent::Created(state.clone()));

        info!(execution_id = %state.execution_id, "Created execution");
        Ok(state)
    }

    /// Fetch an execution by id. Unknown ids yield `Ok(None)`.
    pub async fn get_execution(&self, execution_id: &str) -> Result<Option<ExecutionState>> {
        self.repository.get(execution_id).await
    }

    /// Transition an execution's status, merging `metadata` and appending
    /// a snapshot. Unknown ids yield `Ok(None)` without creating an entry.
    #[instrument(skip(self, metadata), fields(execution_id, new_status = %new_status))]
    pub async fn update_status(
        &self,
        execution_id: &str,
        new_status: ExecutionStatus,
        metadata: Option<JsonMap>,
    ) -> Result<Option<ExecutionState>> {
        let Some(mut state) = self.repository.get(execution_id).await? else {
            warn!(execution_id = %execution_id, "Execution not found for status update");
            return Ok(None);
        };

        if state.status.is_terminal() && !new_status.is_terminal() {
            warn!(
                execution_id = %execution_id,
                from = %state.status,
                to = %new_status,
                "Transition leaves a terminal status"
            );
        }

        let was_terminal = state.status.is_terminal();
        state.update_status(new_status, metadata);
        self.repository.save(&state).await?;

        self.metrics.status_updated();
        if !was_terminal && new_status.is_terminal() {
            let duration_ms = (state.modified_at - state.created_at)
                .num_milliseconds()
                .max(0) as u64;
            match new_status {
                ExecutionStatus::Completed => self.metrics.execution_succeeded(duration_ms),
                _ => self.metrics.execution_failed(duration_ms),
            }
        }

        let _ = self
            .event_sender
            .send(ExecutionEvent::StatusUpdated(execution_id.to_string(), new_status));

        info!(execution_id = %execution_id, new_status = %new_status, "Execution status updated");
        Ok(Some(state))
    }

    /// Record an output on an execution. Unknown ids yield `Ok(None)`.
    pub async fn set_output(
        &self,
        execution_id: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<Option<ExecutionState>> {
        let Some(mut state) = self.repository.get(execution_id).await? else {
            return Ok(None);
        };
        state.set_output(key, value);
        self.repository.save(&state).await?;
        Ok(Some(state))
    }

    /// Attach metadata to an execution. Unknown ids yield `Ok(None)`.
    pub async fn add_metadata(
        &self,
        execution_id: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<Option<ExecutionState>> {
        let Some(mut state) = self.repository.get(execution_id).await? else {
            return Ok(None);
        };
        state.add_metadata(key, value);
        self.repository.save(&state).await?;
        Ok(Some(state))
    }

    /// List all persisted executions.
    pub async fn list_executions(&self) -> Result<Vec<ExecutionState>> {
        self.repository.list().await
    }
}
