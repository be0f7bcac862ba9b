//! Heartbeat change detection.
//!
//! An agent publishes a full status row only when its snapshot moved
//! noticeably since the last full write; otherwise it only refreshes the
//! liveness timestamp.

use serde::{Deserialize, Serialize};

use crate::resources::{GpuSnapshot, ResourceSnapshot};

/// Everything an agent publishes in a heartbeat besides its identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatSnapshot {
    pub resources: ResourceSnapshot,
    /// Model currently loaded by the inference engine, if any.
    pub active_model: Option<String>,
    /// Models installed on the agent, in the engine's listing order.
    pub installed_models: Vec<String>,
}

/// Per-field change tolerance below which a heartbeat is liveness-only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeartbeatTolerance {
    /// Applies to CPU, RAM and GPU utilisation percentages.
    pub percent: f64,
    /// Applies to RAM total and GPU memory figures.
    pub megabytes: i64,
}

impl Default for HeartbeatTolerance {
    fn default() -> Self {
        Self {
            percent: 2.0,
            megabytes: 256,
        }
    }
}

/// Kind of write a heartbeat needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatWrite {
    /// Upsert every published field.
    Full,
    /// Only refresh `last_heartbeat`.
    TouchOnly,
}

/// Decide how to publish `next` given the last fully written snapshot.
///
/// A full write is required when there is no previous snapshot, when the
/// active model or installed model list changed, when a GPU appeared or
/// disappeared, or when any numeric field moved by at least the tolerance.
pub fn decide(
    previous: Option<&HeartbeatSnapshot>,
    next: &HeartbeatSnapshot,
    tolerance: HeartbeatTolerance,
) -> HeartbeatWrite {
    let Some(previous) = previous else {
        return HeartbeatWrite::Full;
    };

    if previous.active_model != next.active_model
        || previous.installed_models != next.installed_models
    {
        return HeartbeatWrite::Full;
    }

    if resources_within(&previous.resources, &next.resources, tolerance) {
        HeartbeatWrite::TouchOnly
    } else {
        HeartbeatWrite::Full
    }
}

fn resources_within(a: &ResourceSnapshot, b: &ResourceSnapshot, tol: HeartbeatTolerance) -> bool {
    let percent_ok = |x: f64, y: f64| (x - y).abs() < tol.percent;
    let mb_ok = |x: i64, y: i64| (x - y).abs() < tol.megabytes;

    let ram_ok = match (a.ram_total_mb, b.ram_total_mb) {
        (Some(x), Some(y)) => mb_ok(x, y),
        (None, None) => true,
        _ => false,
    };

    let gpu_ok = match (a.gpu, b.gpu) {
        (GpuSnapshot::Unavailable, GpuSnapshot::Unavailable) => true,
        (
            GpuSnapshot::Present {
                util_percent: ua,
                mem_used_mb: usa,
                mem_total_mb: ta,
            },
            GpuSnapshot::Present {
                util_percent: ub,
                mem_used_mb: usb,
                mem_total_mb: tb,
            },
        ) => percent_ok(ua, ub) && mb_ok(usa, usb) && mb_ok(ta, tb),
        _ => false,
    };

    percent_ok(a.cpu_percent, b.cpu_percent)
        && percent_ok(a.mem_percent, b.mem_percent)
        && ram_ok
        && gpu_ok
}
