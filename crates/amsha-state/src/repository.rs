//! State persistence capability.
//!
//! Any key-value or document store satisfying [`StateRepository`] is
//! pluggable; the in-memory implementation here is the default for tests
//! and short-lived processes.

use amsha_core::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::state::ExecutionState;

/// Persistence capability for execution states.
#[async_trait]
pub trait StateRepository: Send + Sync {
    /// Persist a state, overwriting any previous version with the same id.
    async fn save(&self, state: &ExecutionState) -> Result<()>;

    /// Fetch a state by execution id. Absence is not an error.
    async fn get(&self, execution_id: &str) -> Result<Option<ExecutionState>>;

    /// Remove a state. Returns whether an entry existed.
    async fn delete(&self, execution_id: &str) -> Result<bool>;

    /// List all persisted states.
    async fn list(&self) -> Result<Vec<ExecutionState>>;
}

/// Unbounded in-memory repository keyed by execution id.
///
/// Concurrent updates to the same execution id are last-writer-wins; the
/// lock guards map integrity, not cross-call read-modify-write sequences.
/// No durability beyond process lifetime.
#[derive(Clone, Default)]
pub struct InMemoryStateRepository {
    executions: Arc<RwLock<HashMap<String, ExecutionState>>>,
}

impl InMemoryStateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored states.
    pub async fn len(&self) -> usize {
        self.executions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.executions.read().await.is_empty()
    }
}

#[async_trait]
impl StateRepository for InMemoryStateRepository {
    async fn save(&self, state: &ExecutionState) -> Result<()> {
        let mut executions = self.executions.write().await;
        executions.insert(state.execution_id.clone(), state.clone());
        Ok(())
    }

    async fn get(&self, execution_id: &str) -> Result<Option<ExecutionState>> {
        let executions = self.executions.read().await;
        Ok(executions.get(execution_id).cloned())
    }

    async fn delete(&self, execution_id: &str) -> Result<bool> {
        let mut executions = self.executions.write().await;
        Ok(executions.remove(execution_id).is_some())
    }

    async fn list(&self) -> Result<Vec<ExecutionState>> {
        let executions = self.executions.read().await;
        Ok(executions.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_get_round_trip() {
        let repo = InMemoryStateRepository::new();
        let state = ExecutionState::new(None);

        repo.save(&state).await.unwrap();
        let fetched = repo.get(&state.execution_id).await.unwrap().unwrap();
        assert_eq!(fetched, state);
    }

    #[tokio::test]
    async fn test_get_unknown_id_is_none() {
        let repo = InMemoryStateRepository::new();
        assert!(repo.get("no-such-id").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let repo = InMemoryStateRepository::new();
        let mut state = ExecutionState::new(None);
        repo.save(&state).await.unwrap();

        state.update_status(crate::state::ExecutionStatus::Running, None);
        repo.save(&state).await.unwrap();

        let fetched = repo.get(&state.execution_id).await.unwrap().unwrap();
        assert_eq!(fetched.status, crate::state::ExecutionStatus::Running);
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = InMemoryStateRepository::new();
        let state = ExecutionState::new(None);
        repo.save(&state).await.unwrap();

        assert!(repo.delete(&state.execution_id).await.unwrap());
        assert!(!repo.delete(&state.execution_id).await.unwrap());
        assert!(repo.get(&state.execution_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list() {
        let repo = InMemoryStateRepository::new();
        for _ in 0..3 {
            repo.save(&ExecutionState::new(None)).await.unwrap();
        }
        assert_eq!(repo.list().await.unwrap().len(), 3);
    }
}
