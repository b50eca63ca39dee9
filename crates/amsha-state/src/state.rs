//! Execution state value objects.
//!
//! An [`ExecutionState`] tracks one run of a unit of work (a crew invocation
//! or arbitrary callable) through its lifecycle. Every status transition
//! appends exactly one [`StateSnapshot`] to the history, so the history is a
//! complete audit trail of the execution.

use amsha_core::{merge_map, JsonMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle status of an execution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ExecutionStatus {
    /// Created, not yet started
    Pending,

    /// Currently running
    Running,

    /// Completed successfully
    Completed,

    /// Failed
    Failed,

    /// Cancelled before completion
    Cancelled,

    /// Suspended, may resume
    Paused,
}

impl ExecutionStatus {
    /// Whether this status ends the execution's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Pending => write!(f, "Pending"),
            ExecutionStatus::Running => write!(f, "Running"),
            ExecutionStatus::Completed => write!(f, "Completed"),
            ExecutionStatus::Failed => write!(f, "Failed"),
            ExecutionStatus::Cancelled => write!(f, "Cancelled"),
            ExecutionStatus::Paused => write!(f, "Paused"),
        }
    }
}

/// Immutable audit record of one status transition.
///
/// The metadata field holds the delta supplied with the transition, not the
/// full accumulated map. Snapshots are never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateSnapshot {
    pub timestamp: DateTime<Utc>,
    pub status: ExecutionStatus,
    pub metadata: JsonMap,
}

/// State of one tracked execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionState {
    /// Unique execution ID
    pub execution_id: String,

    /// Current lifecycle status
    pub status: ExecutionStatus,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp
    pub modified_at: DateTime<Utc>,

    /// Inputs the execution was created with
    pub inputs: JsonMap,

    /// Outputs produced so far, keyed by name
    pub outputs: JsonMap,

    /// Accumulated metadata
    pub metadata: JsonMap,

    /// Append-only status transition history
    pub history: Vec<StateSnapshot>,
}

impl ExecutionState {
    /// Create a new execution state in `Pending` status.
    pub fn new(inputs: Option<JsonMap>) -> Self {
        let now = Utc::now();
        Self {
            execution_id: Uuid::new_v4().to_string(),
            status: ExecutionStatus::Pending,
            created_at: now,
            modified_at: now,
            inputs: inputs.unwrap_or_default(),
            outputs: JsonMap::new(),
            metadata: JsonMap::new(),
            history: Vec::new(),
        }
    }

    /// Transition to `new_status`, merging `metadata` into the accumulated
    /// map and appending one snapshot that records the delta.
    ///
    /// Transitions are permissive: any status may follow any other. Callers
    /// that want stricter handling can consult [`ExecutionStatus::is_terminal`]
    /// before transitioning.
    pub fn update_status(&mut self, new_status: ExecutionStatus, metadata: Option<JsonMap>) {
        let delta = metadata.unwrap_or_default();
        merge_map(&mut self.metadata, &delta);
        self.status = new_status;
        self.modified_at = Utc::now();
        self.history.push(StateSnapshot {
            timestamp: self.modified_at,
            status: new_status,
            metadata: delta,
        });
    }

    /// Record an output value under `key`.
    pub fn set_output(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.outputs.insert(key.into(), value);
        self.modified_at = Utc::now();
    }

    /// Attach a metadata value under `key`.
    pub fn add_metadata(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.metadata.insert(key.into(), value);
        self.modified_at = Utc::now();
    }
}
