//! Execution handles.
//!
//! A handle is ephemeral: one per submitted execution. It reports current
//! status, lets the caller await the result (with an optional deadline),
//! and supports best-effort cancellation. A handle's execution id may
//! correlate with a persisted `ExecutionState`, but handles and states are
//! tracked by independent systems.

use amsha_core::{Error, Result};
use amsha_state::ExecutionStatus;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::AbortHandle;
use tracing::debug;

/// How a submitted execution is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// The caller's task runs the work inline and blocks on it
    Interactive,

    /// The work is spawned onto the runtime; the caller gets the handle
    /// back immediately
    Background,

    /// Like background, but the work starts after the given delay
    Scheduled(Duration),
}

/// Handle to one submitted execution.
pub struct ExecutionHandle {
    execution_id: String,
    label: String,
    status_rx: watch::Receiver<ExecutionStatus>,
    status_tx: Arc<watch::Sender<ExecutionStatus>>,
    result_rx: Option<oneshot::Receiver<Result<Value>>>,
    abort: Option<AbortHandle>,
}

impl ExecutionHandle {
    pub(crate) fn new(
        execution_id: String,
        label: String,
        status_rx: watch::Receiver<ExecutionStatus>,
        status_tx: Arc<watch::Sender<ExecutionStatus>>,
        result_rx: oneshot::Receiver<Result<Value>>,
        abort: Option<AbortHandle>,
    ) -> Self {
        Self {
            execution_id,
            label,
            status_rx,
            status_tx,
            result_rx: Some(result_rx),
            abort,
        }
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Current status of the underlying work.
    pub fn status(&self) -> ExecutionStatus {
        *self.status_rx.borrow()
    }

    /// Await the result, up to `timeout` when one is given.
    ///
    /// Returns the produced value, or the error the work raised; an elapsed
    /// deadline is a `Timeout` error. The result can be consumed once.
    pub async fn result(&mut self, timeout: Option<Duration>) -> Result<Value> {
        let rx = self
            .result_rx
            .take()
            .ok_or_else(|| Error::internal(format!("Result of '{}' already consumed", self.label)))?;

        let received = match timeout {
            Some(deadline) => match tokio::time::timeout(deadline, rx).await {
                Ok(received) => received,
                Err(_) => {
                    return Err(Error::timeout(format!(
                        "Execution '{}' did not finish within {:?}",
                        self.label, deadline
                    )))
                }
            },
            None => rx.await,
        };

        match received {
            Ok(outcome) => outcome,
            // Sender dropped without a value: the work was torn down.
            Err(_) => Err(Error::cancelled(format!("Execution '{}' was cancelled", self.label))),
        }
    }

    /// Best-effort cancellation.
    ///
    /// Marks the execution cancelled and aborts the underlying task if one
    /// is still running. Returns whether there was anything left to cancel;
    /// work already past a cancellation point is not guaranteed to stop.
    pub fn cancel(&self) -> bool {
        if self.status().is_terminal() {
            return false;
        }

        self.status_tx.send_replace(ExecutionStatus::Cancelled);
        if let Some(abort) = &self.abort {
            abort.abort();
        }
        debug!(execution_id = %self.execution_id, label = %self.label, "Cancelled execution");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduled_mode_carries_delay() {
        let mode = ExecutionMode::Scheduled(Duration::from_millis(50));
        match mode {
            ExecutionMode::Scheduled(delay) => assert_eq!(delay, Duration::from_millis(50)),
            _ => panic!("wrong mode"),
        }
    }
}
