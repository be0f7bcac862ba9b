//! Model catalog rows.

use relay_core::compat::ModelRequirements;
use relay_core::types::Timestamp;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `model_specs` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ModelSpec {
    pub name: String,
    pub requires_gpu: bool,
    pub min_ram_mb: Option<i64>,
    pub min_vram_mb: Option<i64>,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ModelSpec {
    pub fn requirements(&self) -> ModelRequirements {
        ModelRequirements {
            name: self.name.clone(),
            requires_gpu: self.requires_gpu,
            min_ram_mb: self.min_ram_mb,
            min_vram_mb: self.min_vram_mb,
        }
    }
}

/// DTO for adding or replacing a catalog entry.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateModelSpec {
    pub name: String,
    #[serde(default)]
    pub requires_gpu: bool,
    pub min_ram_mb: Option<i64>,
    pub min_vram_mb: Option<i64>,
}
