//! Repository for the `model_specs` catalog.

use sqlx::PgPool;

use crate::models::model_spec::{CreateModelSpec, ModelSpec};

/// Column list for `model_specs` queries.
const COLUMNS: &str = "\
    name, requires_gpu, min_ram_mb, min_vram_mb, is_active, created_at, updated_at";

pub struct ModelSpecRepo;

impl ModelSpecRepo {
    /// Insert a catalog entry, or replace its requirements on name conflict.
    pub async fn upsert(pool: &PgPool, input: &CreateModelSpec) -> Result<ModelSpec, sqlx::Error> {
        let query = format!(
            "INSERT INTO model_specs (name, requires_gpu, min_ram_mb, min_vram_mb) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (name) DO UPDATE SET \
                requires_gpu = EXCLUDED.requires_gpu, \
                min_ram_mb = EXCLUDED.min_ram_mb, \
                min_vram_mb = EXCLUDED.min_vram_mb, \
                updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ModelSpec>(&query)
            .bind(&input.name)
            .bind(input.requires_gpu)
            .bind(input.min_ram_mb)
            .bind(input.min_vram_mb)
            .fetch_one(pool)
            .await
    }

    pub async fn list_active(pool: &PgPool) -> Result<Vec<ModelSpec>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM model_specs WHERE is_active ORDER BY name ASC");
        sqlx::query_as::<_, ModelSpec>(&query).fetch_all(pool).await
    }
}
