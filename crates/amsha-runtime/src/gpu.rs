//! GPU telemetry probe.
//!
//! GPU instrumentation is optional: the monitor accepts any [`GpuProbe`]
//! implementation and degrades to CPU-only metrics when none is installed.
//! A backend over NVML (or similar) plugs in behind this trait; the mock
//! probe here backs tests and dry runs.

use serde::{Deserialize, Serialize};

/// One device's telemetry at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GpuSample {
    /// Device index
    pub device_id: u32,
    /// Device name (e.g. "RTX 4090")
    pub name: String,
    /// Compute utilization (0-100%)
    pub utilization_percent: u32,
    /// Used VRAM in MB
    pub memory_used_mb: u64,
    /// Total VRAM in MB
    pub memory_total_mb: u64,
}

/// Capability to sample per-device GPU telemetry.
pub trait GpuProbe: Send + Sync {
    /// Sample all visible devices. An empty vec means no devices.
    fn sample(&self) -> Vec<GpuSample>;
}

/// Fixed-sample probe for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MockGpuProbe {
    samples: Vec<GpuSample>,
}

impl MockGpuProbe {
    /// Probe reporting `num_devices` synthetic devices.
    pub fn with_devices(num_devices: u32) -> Self {
        let samples = (0..num_devices)
            .map(|device_id| GpuSample {
                device_id,
                name: format!("Mock GPU {device_id}"),
                utilization_percent: 60,
                memory_used_mb: 4096,
                memory_total_mb: 24576,
            })
            .collect();
        Self { samples }
    }

    /// Probe reporting exactly these samples.
    pub fn with_samples(samples: Vec<GpuSample>) -> Self {
        Self { samples }
    }
}

impl GpuProbe for MockGpuProbe {
    fn sample(&self) -> Vec<GpuSample> {
        self.samples.clone()
    }
}
