//! Agent heartbeat rows.

use relay_core::error::CoreError;
use relay_core::heartbeat::HeartbeatSnapshot;
use relay_core::resources::{GpuSnapshot, ResourceSnapshot};
use relay_core::types::Timestamp;
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `agent_status` table.
///
/// The three `gpu_*` columns are either all set or all NULL.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct AgentStatus {
    pub agent_name: String,
    pub hostname: String,
    pub last_heartbeat: Timestamp,
    pub is_available: bool,
    pub cpu_percent: f64,
    pub mem_percent: f64,
    pub ram_total_mb: Option<i64>,
    pub gpu_util_percent: Option<f64>,
    pub gpu_mem_used_mb: Option<i64>,
    pub gpu_mem_total_mb: Option<i64>,
    pub active_model: Option<String>,
    pub installed_models: Vec<String>,
    pub updated_at: Timestamp,
}

impl AgentStatus {
    /// Resource view used by compatibility checks.
    pub fn resources(&self) -> Result<ResourceSnapshot, CoreError> {
        Ok(ResourceSnapshot {
            cpu_percent: self.cpu_percent,
            mem_percent: self.mem_percent,
            ram_total_mb: self.ram_total_mb,
            gpu: GpuSnapshot::from_columns(
                self.gpu_util_percent,
                self.gpu_mem_used_mb,
                self.gpu_mem_total_mb,
            )?,
        })
    }
}

/// Full heartbeat write for one agent.
#[derive(Debug, Clone)]
pub struct AgentStatusUpsert {
    pub agent_name: String,
    pub hostname: String,
    pub snapshot: HeartbeatSnapshot,
}
