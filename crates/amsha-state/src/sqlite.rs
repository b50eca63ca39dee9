//! SQLite-backed state repository.
//!
//! Provides durable storage for execution states. Uses SQLx for async
//! database operations. The full state is stored as a JSON document with
//! the status and timestamps broken out into columns for querying.

use amsha_core::{Error, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, info};

use crate::repository::StateRepository;
use crate::state::ExecutionState;

/// SQLite-backed repository for execution states.
pub struct SqliteStateRepository {
    pool: SqlitePool,
}

impl SqliteStateRepository {
    /// Open (or create) a store at the given database URL.
    ///
    /// URL format: `sqlite:///path/to/db.sqlite` or `sqlite::memory:`
    pub async fn new(url: &str) -> Result<Self> {
        info!(url = %url, "Opening SQLite state repository");

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| Error::database(e.to_string()))?;

        let repo = Self { pool };
        repo.initialize_schema().await?;
        Ok(repo)
    }

    /// Create an in-memory store for testing.
    pub async fn in_memory() -> Result<Self> {
        Self::new("sqlite::memory:").await
    }

    async fn initialize_schema(&self) -> Result<()> {
        debug!("Initializing state repository schema");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS executions (
                execution_id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                state TEXT NOT NULL,
                created_at TEXT NOT NULL,
                modified_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::database(e.to_string()))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_executions_status ON executions(status)")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::database(e.to_string()))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_executions_created ON executions(created_at)")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::database(e.to_string()))?;

        Ok(())
    }

    fn row_to_state(row: &sqlx::sqlite::SqliteRow) -> Result<ExecutionState> {
        let state_json: String = row.get("state");
        Ok(serde_json::from_str(&state_json)?)
    }
}

#[async_trait]
impl StateRepository for SqliteStateRepository {
    async fn save(&self, state: &ExecutionState) -> Result<()> {
        let state_json = serde_json::to_string(state)?;

        sqlx::query(
            r#"
            INSERT INTO executions (execution_id, status, state, created_at, modified_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(execution_id) DO UPDATE SET
                status = excluded.status,
                state = excluded.state,
                modified_at = excluded.modified_at
            "#,
        )
        .bind(&state.execution_id)
        .bind(state.status.to_string())
        .bind(&state_json)
        .bind(state.created_at.to_rfc3339())
        .bind(state.modified_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::database(e.to_string()))?;

        debug!(execution_id = %state.execution_id, status = %state.status, "Saved execution state");
        Ok(())
    }

    async fn get(&self, execution_id: &str) -> Result<Option<ExecutionState>> {
        let row = sqlx::query("SELECT state FROM executions WHERE execution_id = ?")
            .bind(execution_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::database(e.to_string()))?;

        match row {
            Some(row) => Ok(Some(Self::row_to_state(&row)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, execution_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM executions WHERE execution_id = ?")
            .bind(execution_id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<ExecutionState>> {
        let rows = sqlx::query("SELECT state FROM executions ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::database(e.to_string()))?;

        rows.iter().map(Self::row_to_state).collect()
    }
}
