//! amsha-state: Execution Lifecycle Tracking
//!
//! Provides:
//! - Execution state value objects with an append-only audit history
//! - A pluggable persistence capability (in-memory and SQLite)
//! - A lifecycle manager with event broadcast and Prometheus metrics

pub mod manager;
pub mod metrics;
pub mod repository;
pub mod sqlite;
pub mod state;

pub use manager::{ExecutionEvent, StateManager};
pub use metrics::ExecutionMetrics;
pub use repository::{InMemoryStateRepository, StateRepository};
pub use sqlite::SqliteStateRepository;
pub use state::{ExecutionState, ExecutionStatus, StateSnapshot};
