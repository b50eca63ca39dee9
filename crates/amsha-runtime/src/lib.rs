//! amsha-runtime: Execution Runtime and Usage Monitoring
//!
//! Provides:
//! - Execution handles with status, awaitable results and best-effort
//!   cancellation
//! - A runtime engine for interactive, background and scheduled submission
//! - A token monitor measuring duration, CPU/memory and optional GPU usage

pub mod engine;
pub mod gpu;
pub mod handle;
pub mod monitor;

pub use engine::RuntimeEngine;
pub use gpu::{GpuProbe, GpuSample, MockGpuProbe};
pub use handle::{ExecutionHandle, ExecutionMode};
pub use monitor::{GeneralMetrics, GpuMetrics, PerformanceMetrics, TokenMonitor};
