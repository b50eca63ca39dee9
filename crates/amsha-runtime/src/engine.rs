//! Runtime engine for submitting executions.
//!
//! Submission is non-blocking for background and scheduled work; failures
//! inside the work surface when `result()` is called, not at submission
//! time. Interactive submissions run the work inline in the caller's task.

use amsha_core::Result;
use amsha_state::ExecutionStatus;
use futures::Future;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{oneshot, watch, Semaphore};
use tracing::{debug, info};
use uuid::Uuid;

use crate::handle::{ExecutionHandle, ExecutionMode};

/// Submits callables for execution and returns handles.
pub struct RuntimeEngine {
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

impl RuntimeEngine {
    /// Engine with the default concurrency cap for background work.
    pub fn new() -> Self {
        Self::with_max_concurrent(8)
    }

    /// Engine capping concurrent background executions at `max`.
    pub fn with_max_concurrent(max: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max.max(1))),
            max_concurrent: max.max(1),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Number of background slots currently free.
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    /// Submit `work` under the given mode.
    ///
    /// Interactive mode awaits the work inline and returns an
    /// already-finished handle. Background and scheduled modes return
    /// immediately; the work runs once a concurrency slot is free (and,
    /// for scheduled work, the delay has elapsed).
    pub async fn submit<F>(&self, label: &str, mode: ExecutionMode, work: F) -> ExecutionHandle
    where
        F: Future<Output = Result<Value>> + Send + 'static,
    {
        let execution_id = Uuid::new_v4().to_string();
        let (status_tx, status_rx) = watch::channel(ExecutionStatus::Pending);
        let status_tx = Arc::new(status_tx);
        let (result_tx, result_rx) = oneshot::channel();

        debug!(execution_id = %execution_id, label = %label, ?mode, "Submitting execution");

        match mode {
            ExecutionMode::Interactive => {
                status_tx.send_replace(ExecutionStatus::Running);
                let outcome = work.await;
                status_tx.send_replace(match &outcome {
                    Ok(_) => ExecutionStatus::Completed,
                    Err(_) => ExecutionStatus::Failed,
                });
                let _ = result_tx.send(outcome);

                ExecutionHandle::new(
                    execution_id,
                    label.to_string(),
                    status_rx,
                    status_tx,
                    result_rx,
                    None,
                )
            }
            ExecutionMode::Background | ExecutionMode::Scheduled(_) => {
                let delay = match mode {
                    ExecutionMode::Scheduled(delay) => Some(delay),
                    _ => None,
                };
                let permits = Arc::clone(&self.permits);
                let task_status = Arc::clone(&status_tx);
                let task_label = label.to_string();
                let task_id = execution_id.clone();

                let join = tokio::spawn(async move {
                    if let Some(delay) = delay {
                        tokio::time::sleep(delay).await;
                    }
                    let _permit = permits.acquire_owned().await.ok();

                    task_status.send_replace(ExecutionStatus::Running);
                    let outcome = work.await;
                    task_status.send_replace(match &outcome {
                        Ok(_) => ExecutionStatus::Completed,
                        Err(_) => ExecutionStatus::Failed,
                    });

                    info!(
                        execution_id = %task_id,
                        label = %task_label,
                        success = outcome.is_ok(),
                        "Background execution finished"
                    );
                    let _ = result_tx.send(outcome);
                });

                ExecutionHandle::new(
                    execution_id,
                    label.to_string(),
                    status_rx,
                    status_tx,
                    result_rx,
                    Some(join.abort_handle()),
                )
            }
        }
    }
}

impl Default for RuntimeEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amsha_core::Error;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_interactive_submission_finishes_inline() {
        let engine = RuntimeEngine::new();
        let mut handle = engine
            .submit("inline", ExecutionMode::Interactive, async { Ok(json!(7)) })
            .await;

        assert_eq!(handle.status(), ExecutionStatus::Completed);
        assert_eq!(handle.result(None).await.unwrap(), json!(7));
    }

    #[tokio::test]
    async fn test_background_result() {
        let engine = RuntimeEngine::new();
        let mut handle = engine
            .submit("bg", ExecutionMode::Background, async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(json!("done"))
            })
            .await;

        assert_eq!(handle.result(None).await.unwrap(), json!("done"));
        assert_eq!(handle.status(), ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn test_background_error_surfaces_at_result_time() {
        let engine = RuntimeEngine::new();
        let mut handle = engine
            .submit("failing", ExecutionMode::Background, async {
                Err(Error::crew("model refused"))
            })
            .await;

        let err = handle.result(None).await.unwrap_err();
        assert!(matches!(err, Error::Crew(_)));
        assert_eq!(handle.status(), ExecutionStatus::Failed);
    }

    #[tokio::test]
    async fn test_result_timeout() {
        let engine = RuntimeEngine::new();
        let mut handle = engine
            .submit("slow", ExecutionMode::Background, async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(json!(null))
            })
            .await;

        let err = handle.result(Some(Duration::from_millis(20))).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test]
    async fn test_cancel_pending_work() {
        let engine = RuntimeEngine::new();
        let mut handle = engine
            .submit(
                "parked",
                ExecutionMode::Scheduled(Duration::from_secs(60)),
                async { Ok(json!(null)) },
            )
            .await;

        assert!(handle.cancel());
        assert_eq!(handle.status(), ExecutionStatus::Cancelled);
        // A second cancel has nothing left to do.
        assert!(!handle.cancel());

        let err = handle.result(Some(Duration::from_millis(100))).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled(_)));
    }

    #[tokio::test]
    async fn test_result_consumed_once() {
        let engine = RuntimeEngine::new();
        let mut handle = engine
            .submit("once", ExecutionMode::Interactive, async { Ok(json!(1)) })
            .await;

        handle.result(None).await.unwrap();
        let err = handle.result(None).await.unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[tokio::test]
    async fn test_scheduled_work_waits_for_delay() {
        let engine = RuntimeEngine::new();
        let handle = engine
            .submit(
                "later",
                ExecutionMode::Scheduled(Duration::from_secs(60)),
                async { Ok(json!(null)) },
            )
            .await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handle.status(), ExecutionStatus::Pending);
    }
}
