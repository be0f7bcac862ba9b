//! Repository for the `agent_status` table.

use relay_core::types::Timestamp;
use sqlx::PgPool;

use crate::models::agent_status::{AgentStatus, AgentStatusUpsert};

/// Column list for `agent_status` queries.
const COLUMNS: &str = "\
    agent_name, hostname, last_heartbeat, is_available, cpu_percent, mem_percent, \
    ram_total_mb, gpu_util_percent, gpu_mem_used_mb, gpu_mem_total_mb, \
    active_model, installed_models, updated_at";

/// Provides heartbeat writes and liveness queries for agents.
pub struct AgentStatusRepo;

impl AgentStatusRepo {
    /// Insert or fully replace an agent's published status.
    pub async fn upsert(
        pool: &PgPool,
        input: &AgentStatusUpsert,
        now: Timestamp,
    ) -> Result<AgentStatus, sqlx::Error> {
        let resources = &input.snapshot.resources;
        let (gpu_util, gpu_used, gpu_total) = resources.gpu.to_columns();

        let query = format!(
            "INSERT INTO agent_status (agent_name, hostname, last_heartbeat, is_available, \
                cpu_percent, mem_percent, ram_total_mb, gpu_util_percent, gpu_mem_used_mb, \
                gpu_mem_total_mb, active_model, installed_models, updated_at) \
             VALUES ($1, $2, $3, true, $4, $5, $6, $7, $8, $9, $10, $11, $3) \
             ON CONFLICT (agent_name) DO UPDATE SET \
                hostname = EXCLUDED.hostname, \
                last_heartbeat = EXCLUDED.last_heartbeat, \
                is_available = true, \
                cpu_percent = EXCLUDED.cpu_percent, \
                mem_percent = EXCLUDED.mem_percent, \
                ram_total_mb = EXCLUDED.ram_total_mb, \
                gpu_util_percent = EXCLUDED.gpu_util_percent, \
                gpu_mem_used_mb = EXCLUDED.gpu_mem_used_mb, \
                gpu_mem_total_mb = EXCLUDED.gpu_mem_total_mb, \
                active_model = EXCLUDED.active_model, \
                installed_models = EXCLUDED.installed_models, \
                updated_at = EXCLUDED.updated_at \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AgentStatus>(&query)
            .bind(&input.agent_name)
            .bind(&input.hostname)
            .bind(now)
            .bind(resources.cpu_percent)
            .bind(resources.mem_percent)
            .bind(resources.ram_total_mb)
            .bind(gpu_util)
            .bind(gpu_used)
            .bind(gpu_total)
            .bind(&input.snapshot.active_model)
            .bind(&input.snapshot.installed_models)
            .fetch_one(pool)
            .await
    }

    /// Refresh only the liveness timestamp.
    ///
    /// Returns `false` when the agent has no row yet.
    pub async fn touch(pool: &PgPool, agent: &str, now: Timestamp) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE agent_status SET last_heartbeat = $2, is_available = true \
             WHERE agent_name = $1",
        )
        .bind(agent)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Available agents heard from since `fresh_since`, least loaded first.
    pub async fn list_available(
        pool: &PgPool,
        fresh_since: Timestamp,
    ) -> Result<Vec<AgentStatus>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM agent_status \
             WHERE is_available AND last_heartbeat >= $1 \
             ORDER BY cpu_percent ASC, mem_percent ASC, agent_name ASC"
        );
        sqlx::query_as::<_, AgentStatus>(&query)
            .bind(fresh_since)
            .fetch_all(pool)
            .await
    }

    /// Flag agents silent since before `stale_before` as unavailable.
    pub async fn mark_stale_unavailable(
        pool: &PgPool,
        stale_before: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE agent_status SET is_available = false \
             WHERE is_available AND last_heartbeat < $1",
        )
        .bind(stale_before)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
