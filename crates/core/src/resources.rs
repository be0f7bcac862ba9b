//! Host resource snapshots published by agents.
//!
//! A missing GPU is modelled as [`GpuSnapshot::Unavailable`], never as a
//! present GPU reporting zero. Agents without NVIDIA drivers, or whose GPU
//! query failed, publish `Unavailable`.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// GPU utilisation and memory as reported by the agent's probe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GpuSnapshot {
    Unavailable,
    Present {
        util_percent: f64,
        mem_used_mb: i64,
        mem_total_mb: i64,
    },
}

impl GpuSnapshot {
    /// Rebuild a snapshot from the three nullable store columns.
    ///
    /// The columns are either all set or all NULL; a partially populated
    /// triplet is rejected instead of being read as zero.
    pub fn from_columns(
        util_percent: Option<f64>,
        mem_used_mb: Option<i64>,
        mem_total_mb: Option<i64>,
    ) -> Result<Self, CoreError> {
        match (util_percent, mem_used_mb, mem_total_mb) {
            (None, None, None) => Ok(GpuSnapshot::Unavailable),
            (Some(util_percent), Some(mem_used_mb), Some(mem_total_mb)) => {
                Ok(GpuSnapshot::Present {
                    util_percent,
                    mem_used_mb,
                    mem_total_mb,
                })
            }
            _ => Err(CoreError::Validation(
                "GPU columns must be either all set or all NULL".to_string(),
            )),
        }
    }

    /// Split into the three nullable store columns.
    pub fn to_columns(self) -> (Option<f64>, Option<i64>, Option<i64>) {
        match self {
            GpuSnapshot::Unavailable => (None, None, None),
            GpuSnapshot::Present {
                util_percent,
                mem_used_mb,
                mem_total_mb,
            } => (Some(util_percent), Some(mem_used_mb), Some(mem_total_mb)),
        }
    }

    /// Total VRAM, `0` when no GPU is present.
    pub fn mem_total_mb(&self) -> i64 {
        match self {
            GpuSnapshot::Unavailable => 0,
            GpuSnapshot::Present { mem_total_mb, .. } => *mem_total_mb,
        }
    }

    /// Free VRAM, `0` when no GPU is present.
    pub fn mem_available_mb(&self) -> i64 {
        match self {
            GpuSnapshot::Unavailable => 0,
            GpuSnapshot::Present {
                mem_used_mb,
                mem_total_mb,
                ..
            } => (mem_total_mb - mem_used_mb).max(0),
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, GpuSnapshot::Present { .. })
    }
}

/// Resource view of one agent, as used by compatibility checks and
/// heartbeat change detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub cpu_percent: f64,
    pub mem_percent: f64,
    /// `None` when the probe could not determine installed RAM.
    pub ram_total_mb: Option<i64>,
    pub gpu: GpuSnapshot,
}

impl ResourceSnapshot {
    /// RAM still available given the used percentage.
    ///
    /// Unknown totals count as nothing available.
    pub fn ram_available_mb(&self) -> f64 {
        match self.ram_total_mb {
            Some(total) if total > 0 => {
                let used = self.mem_percent.clamp(0.0, 100.0);
                (1.0 - used / 100.0) * total as f64
            }
            _ => 0.0,
        }
    }
}
