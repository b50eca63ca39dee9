//! Usage monitoring for crew executions.
//!
//! A [`TokenMonitor`] wraps one unit of work: it captures a baseline at
//! start, computes duration and CPU/memory deltas at stop, folds token
//! usage out of crew results, and renders a human-readable summary. GPU
//! figures appear only when a probe is installed; absence of GPU
//! instrumentation never raises.

use amsha_crew::{CrewResult, TokenUsage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use sysinfo::System;
use tracing::{debug, warn};

use crate::gpu::{GpuProbe, GpuSample};

/// Process-level figures for one monitored run.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GeneralMetrics {
    pub duration_ms: u64,
    pub cpu_percent: f32,
    pub memory_delta_mb: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Per-device deltas for one monitored run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GpuMetrics {
    pub device_id: u32,
    pub name: String,
    pub utilization_percent: u32,
    pub memory_used_mb: u64,
    pub memory_delta_mb: i64,
}

/// Everything measured for one monitored run.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PerformanceMetrics {
    pub general: GeneralMetrics,
    pub gpu: Vec<GpuMetrics>,
}

struct Baseline {
    start: Instant,
    started_at: DateTime<Utc>,
    memory_bytes: u64,
    gpu: Vec<GpuSample>,
}

/// Wraps a unit of work to measure duration, CPU/memory and optional GPU
/// utilization, and to accumulate token usage from crew results.
pub struct TokenMonitor {
    system: System,
    pid: Option<sysinfo::Pid>,
    gpu_probe: Option<Arc<dyn GpuProbe>>,
    baseline: Option<Baseline>,
    performance: Option<PerformanceMetrics>,
    usage: TokenUsage,
}

impl TokenMonitor {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid().ok();
        if pid.is_none() {
            warn!("Could not resolve current pid, process metrics disabled");
        }
        Self {
            system: System::new(),
            pid,
            gpu_probe: None,
            baseline: None,
            performance: None,
            usage: TokenUsage::default(),
        }
    }

    /// Install a GPU probe. Without one, metrics are CPU-only.
    pub fn with_gpu_probe(mut self, probe: Arc<dyn GpuProbe>) -> Self {
        self.gpu_probe = Some(probe);
        self
    }

    fn process_memory(&mut self) -> u64 {
        let Some(pid) = self.pid else { return 0 };
        self.system.refresh_process(pid);
        self.system.process(pid).map(|p| p.memory()).unwrap_or(0)
    }

    fn process_cpu(&mut self) -> f32 {
        let Some(pid) = self.pid else { return 0.0 };
        self.system.refresh_process(pid);
        self.system.process(pid).map(|p| p.cpu_usage()).unwrap_or(0.0)
    }

    /// Capture the start timestamp and resource baselines.
    pub fn start_monitoring(&mut self) {
        let memory_bytes = self.process_memory();
        // Prime the CPU counter so the stop-side reading covers the run.
        let _ = self.process_cpu();
        let gpu = self
            .gpu_probe
            .as_ref()
            .map(|probe| probe.sample())
            .unwrap_or_default();

        self.baseline = Some(Baseline {
            start: Instant::now(),
            started_at: Utc::now(),
            memory_bytes,
            gpu,
        });
    }

    /// Capture end-of-run deltas. Without a prior start this yields zeroed
    /// metrics rather than an error.
    pub fn stop_monitoring(&mut self) -> PerformanceMetrics {
        let Some(baseline) = self.baseline.take() else {
            warn!("stop_monitoring called without start_monitoring");
            let metrics = PerformanceMetrics::default();
            self.performance = Some(metrics.clone());
            return metrics;
        };

        let cpu_percent = self.process_cpu();
        let memory_bytes = self.process_memory();
        let memory_delta_mb =
            (memory_bytes as i64 - baseline.memory_bytes as i64) / (1024 * 1024);

        let end_gpu = self
            .gpu_probe
            .as_ref()
            .map(|probe| probe.sample())
            .unwrap_or_default();
        let gpu = end_gpu
            .into_iter()
            .map(|sample| {
                let baseline_used = baseline
                    .gpu
                    .iter()
                    .find(|b| b.device_id == sample.device_id)
                    .map(|b| b.memory_used_mb)
                    .unwrap_or(sample.memory_used_mb);
                GpuMetrics {
                    device_id: sample.device_id,
                    name: sample.name,
                    utilization_percent: sample.utilization_percent,
                    memory_used_mb: sample.memory_used_mb,
                    memory_delta_mb: sample.memory_used_mb as i64 - baseline_used as i64,
                }
            })
            .collect();

        let metrics = PerformanceMetrics {
            general: GeneralMetrics {
                duration_ms: baseline.start.elapsed().as_millis() as u64,
                cpu_percent,
                memory_delta_mb,
                started_at: Some(baseline.started_at),
                finished_at: Some(Utc::now()),
            },
            gpu,
        };
        self.performance = Some(metrics.clone());
        metrics
    }

    /// Fold the token usage out of a crew result into the running totals.
    pub fn log_usage(&mut self, result: &CrewResult) {
        match result.token_usage() {
            Some(usage) => self.usage.merge(&usage),
            None => debug!("Crew result carried no token usage"),
        }
    }

    /// Accumulated token usage.
    pub fn usage(&self) -> TokenUsage {
        self.usage
    }

    /// Metrics of the last stopped run, if any.
    pub fn performance(&self) -> Option<&PerformanceMetrics> {
        self.performance.as_ref()
    }

    /// Human-readable usage summary. Always contains a "Total Tokens" line.
    pub fn get_summary(&self) -> String {
        let mut lines = vec!["Execution Usage Summary".to_string(), "=".repeat(23)];

        if let Some(perf) = &self.performance {
            lines.push(format!(
                "Duration: {:.3} s",
                perf.general.duration_ms as f64 / 1000.0
            ));
            lines.push(format!("CPU: {:.1}%", perf.general.cpu_percent));
            lines.push(format!("Memory Delta: {:+} MB", perf.general.memory_delta_mb));
            for gpu in &perf.gpu {
                lines.push(format!(
                    "GPU {} ({}): {}% util, {} MB used ({:+} MB)",
                    gpu.device_id,
                    gpu.name,
                    gpu.utilization_percent,
                    gpu.memory_used_mb,
                    gpu.memory_delta_mb
                ));
            }
        }

        lines.push(format!("Prompt Tokens: {}", self.usage.prompt_tokens));
        lines.push(format!("Completion Tokens: {}", self.usage.completion_tokens));
        lines.push(format!("Total Tokens: {}", self.usage.total_tokens));
        lines.join("\n")
    }

    /// The same data as a JSON value, for merging into execution metadata.
    pub fn metrics_json(&self) -> serde_json::Value {
        serde_json::json!({
            "performance": self.performance,
            "usage": self.usage,
        })
    }
}

impl Default for TokenMonitor {
    fn default() -> Self {
        Self::new()
    }
}
