//! Host resource probes.
//!
//! [`SystemProbe`] reads CPU and RAM through `sysinfo` and GPU figures
//! through NVML. NVML initialisation is optional: without NVIDIA drivers
//! the probe logs a warning once and reports [`GpuSnapshot::Unavailable`].

use std::sync::{Mutex, PoisonError};

use nvml_wrapper::Nvml;
use relay_core::resources::{GpuSnapshot, ResourceSnapshot};
use sysinfo::System;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Source of the resource figures an agent publishes.
pub trait ResourceProbe: Send + Sync {
    fn cpu_percent(&self) -> f64;
    fn mem_percent(&self) -> f64;
    /// `None` if installed RAM cannot be determined.
    fn ram_total_mb(&self) -> Option<i64>;
    fn gpu_snapshot(&self) -> GpuSnapshot;

    fn snapshot(&self) -> ResourceSnapshot {
        ResourceSnapshot {
            cpu_percent: self.cpu_percent(),
            mem_percent: self.mem_percent(),
            ram_total_mb: self.ram_total_mb(),
            gpu: self.gpu_snapshot(),
        }
    }
}

pub struct SystemProbe {
    system: Mutex<System>,
    /// `None` when NVML could not be initialised (no drivers / no GPU).
    nvml: Option<Nvml>,
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is a delta between refreshes; prime the first sample.
        system.refresh_cpu_usage();
        system.refresh_memory();

        let nvml = match Nvml::init() {
            Ok(nvml) => {
                tracing::info!("NVML initialised successfully");
                Some(nvml)
            }
            Err(e) => {
                tracing::warn!(error = %e, "NVML unavailable -- reporting no GPU");
                None
            }
        };

        Self {
            system: Mutex::new(system),
            nvml,
        }
    }

    /// Number of GPUs visible to NVML, or 0 if NVML is unavailable.
    pub fn gpu_count(&self) -> u32 {
        self.nvml
            .as_ref()
            .and_then(|nvml| nvml.device_count().ok())
            .unwrap_or(0)
    }

    fn with_system<T>(&self, f: impl FnOnce(&mut System) -> T) -> T {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut system)
    }

    /// Sum memory and average utilisation over every readable device.
    fn read_gpus(nvml: &Nvml) -> Result<GpuSnapshot, nvml_wrapper::error::NvmlError> {
        let count = nvml.device_count()?;
        let mut util_sum = 0.0;
        let mut used_mb = 0i64;
        let mut total_mb = 0i64;
        let mut read = 0u32;

        for idx in 0..count {
            let device = match nvml.device_by_index(idx) {
                Ok(device) => device,
                Err(e) => {
                    tracing::warn!(gpu_index = idx, error = %e, "Skipping GPU -- device query failed");
                    continue;
                }
            };
            match (device.memory_info(), device.utilization_rates()) {
                (Ok(mem), Ok(util)) => {
                    util_sum += f64::from(util.gpu);
                    used_mb += (mem.used / BYTES_PER_MB) as i64;
                    total_mb += (mem.total / BYTES_PER_MB) as i64;
                    read += 1;
                }
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!(gpu_index = idx, error = %e, "Skipping GPU -- metrics query failed");
                }
            }
        }

        if read == 0 {
            return Ok(GpuSnapshot::Unavailable);
        }
        Ok(GpuSnapshot::Present {
            util_percent: util_sum / f64::from(read),
            mem_used_mb: used_mb,
            mem_total_mb: total_mb,
        })
    }
}

impl ResourceProbe for SystemProbe {
    fn cpu_percent(&self) -> f64 {
        self.with_system(|system| {
            system.refresh_cpu_usage();
            f64::from(system.global_cpu_usage())
        })
    }

    fn mem_percent(&self) -> f64 {
        self.with_system(|system| {
            system.refresh_memory();
            let total = system.total_memory();
            if total == 0 {
                return 100.0;
            }
            let used = total.saturating_sub(system.available_memory());
            used as f64 / total as f64 * 100.0
        })
    }

    fn ram_total_mb(&self) -> Option<i64> {
        let total = self.with_system(|system| system.total_memory());
        (total > 0).then(|| (total / BYTES_PER_MB) as i64)
    }

    fn gpu_snapshot(&self) -> GpuSnapshot {
        let Some(nvml) = self.nvml.as_ref() else {
            return GpuSnapshot::Unavailable;
        };
        match Self::read_gpus(nvml) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(error = %e, "Failed to query GPU device count");
                GpuSnapshot::Unavailable
            }
        }
    }
}
