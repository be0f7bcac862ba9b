//! Repository for the append-only `request_transitions` table.

use relay_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::transition::{NewTransition, RequestTransition};

/// Column list for `request_transitions` queries.
const COLUMNS: &str = "id, request_id, from_status, to_status, agent_name, detail, recorded_at";

pub struct TransitionRepo;

impl TransitionRepo {
    pub async fn record(
        pool: &PgPool,
        input: &NewTransition,
        now: Timestamp,
    ) -> Result<RequestTransition, sqlx::Error> {
        let query = format!(
            "INSERT INTO request_transitions (request_id, from_status, to_status, agent_name, detail, recorded_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RequestTransition>(&query)
            .bind(input.request_id)
            .bind(input.from_status.map(|s| s.as_str()))
            .bind(input.to_status.as_str())
            .bind(&input.agent_name)
            .bind(&input.detail)
            .bind(now)
            .fetch_one(pool)
            .await
    }

    /// Transitions of one request in recording order.
    pub async fn list_for_request(
        pool: &PgPool,
        request_id: DbId,
    ) -> Result<Vec<RequestTransition>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM request_transitions WHERE request_id = $1 ORDER BY id ASC"
        );
        sqlx::query_as::<_, RequestTransition>(&query)
            .bind(request_id)
            .fetch_all(pool)
            .await
    }
}
