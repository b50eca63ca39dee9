//! Prometheus metrics for tracked executions.

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};

/// Execution metrics collector.
///
/// Metric names are kept label-free to avoid high-cardinality series.
#[derive(Clone)]
pub struct ExecutionMetrics {
    executions_started: IntCounter,
    active_executions: IntGauge,
    executions_succeeded: IntCounter,
    executions_failed: IntCounter,
    execution_duration: Histogram,
    status_transitions: IntCounter,
    registry: Registry,
}

impl ExecutionMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let executions_started = IntCounter::new(
            "amsha_executions_started_total",
            "Total number of executions created",
        )?;
        registry.register(Box::new(executions_started.clone()))?;

        let active_executions = IntGauge::new(
            "amsha_active_executions",
            "Number of executions not yet in a terminal status",
        )?;
        registry.register(Box::new(active_executions.clone()))?;

        let executions_succeeded = IntCounter::new(
            "amsha_executions_succeeded_total",
            "Total number of executions that completed",
        )?;
        registry.register(Box::new(executions_succeeded.clone()))?;

        let executions_failed = IntCounter::new(
            "amsha_executions_failed_total",
            "Total number of executions that failed or were cancelled",
        )?;
        registry.register(Box::new(executions_failed.clone()))?;

        let execution_duration = Histogram::with_opts(
            HistogramOpts::new(
                "amsha_execution_duration_seconds",
                "Execution duration from creation to terminal status",
            )
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        )?;
        registry.register(Box::new(execution_duration.clone()))?;

        let status_transitions = IntCounter::new(
            "amsha_status_transitions_total",
            "Total number of execution status transitions",
        )?;
        registry.register(Box::new(status_transitions.clone()))?;

        Ok(Self {
            executions_started,
            active_executions,
            executions_succeeded,
            executions_failed,
            execution_duration,
            status_transitions,
            registry,
        })
    }

    pub fn execution_started(&self) {
        self.executions_started.inc();
        self.active_executions.inc();
    }

    pub fn status_updated(&self) {
        self.status_transitions.inc();
    }

    pub fn execution_succeeded(&self, duration_ms: u64) {
        self.executions_succeeded.inc();
        self.execution_duration.observe(duration_ms as f64 / 1000.0);
        self.active_executions.dec();
    }

    pub fn execution_failed(&self, duration_ms: u64) {
        self.executions_failed.inc();
        self.execution_duration.observe(duration_ms as f64 / 1000.0);
        self.active_executions.dec();
    }

    /// Registry for scraping.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Simplified JSON rendering of the gathered metric families.
    pub fn to_json(&self) -> serde_json::Value {
        let families = self.registry.gather();
        let metrics: Vec<_> = families
            .iter()
            .map(|family| {
                serde_json::json!({
                    "name": family.get_name(),
                    "help": family.get_help(),
                    "metric_count": family.get_metric().len(),
                })
            })
            .collect();

        serde_json::json!({ "metrics": metrics })
    }
}

impl Default for ExecutionMetrics {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_track_lifecycle() {
        let metrics = ExecutionMetrics::new().unwrap();
        metrics.execution_started();
        metrics.execution_started();
        metrics.status_updated();
        metrics.execution_succeeded(1200);
        metrics.execution_failed(300);

        assert_eq!(metrics.executions_started.get(), 2);
        assert_eq!(metrics.executions_succeeded.get(), 1);
        assert_eq!(metrics.executions_failed.get(), 1);
        assert_eq!(metrics.active_executions.get(), 0);
        assert_eq!(metrics.status_transitions.get(), 1);
    }

    #[test]
    fn test_json_rendering_lists_families() {
        let metrics = ExecutionMetrics::new().unwrap();
        let json = metrics.to_json();
        let families = json["metrics"].as_array().unwrap();
        assert!(families.iter().any(|f| f["name"] == "amsha_executions_started_total"));
    }
}
