//! Repository for the `requests` table.
//!
//! Every mutation is a single `UPDATE ... WHERE id = $1 AND <guard>`; the
//! guard encodes the expected source status so that a lost race affects
//! zero rows instead of moving a request backwards.

use relay_core::status::RequestStatus;
use relay_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::request::{Assignment, Claim, Completion, NewRequest, Request};

/// Column list for `requests` queries.
const COLUMNS: &str = "\
    id, user_id, dialog_id, text, status, assigned_agent, assigned_prompt, model, \
    locked_by, locked_at, lease_expires_at, response, error_message, delivered, \
    created_at, started_at, finished_at";

/// Predicate selecting rows `$1` may claim at `$2`.
const CLAIMABLE: &str = "\
    ((status = 'queued' AND assigned_agent = $1 AND (locked_by IS NULL OR locked_by = $1)) \
     OR (status = 'progress' AND lease_expires_at <= $2))";

/// Provides queries and guarded updates for inference requests.
pub struct RequestRepo;

impl RequestRepo {
    // ── Front-end contract ───────────────────────────────────────────────

    /// Insert a `new`, unassigned request.
    pub async fn submit(
        pool: &PgPool,
        input: &NewRequest,
        now: Timestamp,
    ) -> Result<Request, sqlx::Error> {
        let query = format!(
            "INSERT INTO requests (user_id, dialog_id, text, status, created_at) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Request>(&query)
            .bind(input.user_id)
            .bind(&input.dialog_id)
            .bind(&input.text)
            .bind(RequestStatus::New.as_str())
            .bind(now)
            .fetch_one(pool)
            .await
    }

    /// Solved requests whose response has not been handed to the user yet.
    pub async fn list_undelivered(pool: &PgPool, limit: i64) -> Result<Vec<Request>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM requests \
             WHERE status = 'solved' AND NOT delivered \
             ORDER BY finished_at ASC, id ASC \
             LIMIT $1"
        );
        sqlx::query_as::<_, Request>(&query)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Flag a solved response as delivered. Returns `false` if it already was.
    pub async fn mark_delivered(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE requests SET delivered = true \
             WHERE id = $1 AND status = 'solved' AND NOT delivered",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ── Dispatcher ───────────────────────────────────────────────────────

    /// Unassigned `new` requests in arrival order.
    pub async fn list_pending(pool: &PgPool) -> Result<Vec<Request>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM requests \
             WHERE status = 'new' AND assigned_agent IS NULL \
             ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, Request>(&query).fetch_all(pool).await
    }

    /// Move a `new` request to `queued` for an agent.
    ///
    /// Returns `false` when another dispatcher got there first.
    pub async fn assign(pool: &PgPool, input: &Assignment) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE requests \
             SET assigned_agent = $2, assigned_prompt = $3, model = $4, status = 'queued' \
             WHERE id = $1 AND status = 'new' AND assigned_agent IS NULL",
        )
        .bind(input.request_id)
        .bind(&input.agent_name)
        .bind(input.prompt_id)
        .bind(&input.model)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ── Agent runtime ────────────────────────────────────────────────────

    /// Oldest request `agent` may claim at `now`.
    pub async fn next_claimable(
        pool: &PgPool,
        agent: &str,
        now: Timestamp,
    ) -> Result<Option<Request>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM requests \
             WHERE {CLAIMABLE} \
             ORDER BY created_at ASC, id ASC \
             LIMIT 1"
        );
        sqlx::query_as::<_, Request>(&query)
            .bind(agent)
            .bind(now)
            .fetch_optional(pool)
            .await
    }

    /// Atomically move a claimable request to `progress` under a lease.
    ///
    /// Returns `None` if the row is no longer claimable by this agent.
    pub async fn claim(pool: &PgPool, input: &Claim) -> Result<Option<Request>, sqlx::Error> {
        let query = format!(
            "UPDATE requests \
             SET status = 'progress', locked_by = $1, locked_at = $2, \
                 lease_expires_at = $5, assigned_agent = $1, dialog_id = $4, \
                 started_at = COALESCE(started_at, $2) \
             WHERE id = $3 AND {CLAIMABLE} \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Request>(&query)
            .bind(&input.agent_name)
            .bind(input.now)
            .bind(input.request_id)
            .bind(&input.dialog_id)
            .bind(input.lease_until)
            .fetch_optional(pool)
            .await
    }

    /// Dialog id and creation time of the user's latest solved request.
    pub async fn latest_solved_for_user(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Option<(String, Timestamp)>, sqlx::Error> {
        sqlx::query_as::<_, (String, Timestamp)>(
            "SELECT dialog_id, created_at FROM requests \
             WHERE user_id = $1 AND status = 'solved' AND dialog_id IS NOT NULL \
             ORDER BY created_at DESC, id DESC \
             LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Text and response of every solved request of a dialog, oldest first.
    pub async fn dialog_exchanges(
        pool: &PgPool,
        dialog_id: &str,
    ) -> Result<Vec<(String, Option<String>)>, sqlx::Error> {
        sqlx::query_as::<_, (String, Option<String>)>(
            "SELECT text, response FROM requests \
             WHERE dialog_id = $1 AND status = 'solved' \
             ORDER BY created_at ASC, id ASC",
        )
        .bind(dialog_id)
        .fetch_all(pool)
        .await
    }

    /// Store the response of a request this agent holds.
    pub async fn complete(pool: &PgPool, input: &Completion) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE requests \
             SET status = 'solved', response = $3, model = $4, finished_at = $5, \
                 assigned_agent = $2, lease_expires_at = NULL \
             WHERE id = $1 AND status = 'progress' AND locked_by = $2",
        )
        .bind(input.request_id)
        .bind(&input.agent_name)
        .bind(&input.response)
        .bind(&input.model)
        .bind(input.now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Move a request this agent holds to `error`.
    pub async fn fail(
        pool: &PgPool,
        id: DbId,
        agent: &str,
        error: &str,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE requests \
             SET status = 'error', error_message = $3, finished_at = $4, lease_expires_at = NULL \
             WHERE id = $1 AND status = 'progress' AND locked_by = $2",
        )
        .bind(id)
        .bind(agent)
        .bind(error)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Expire every lease `agent` still holds so the rows become claimable.
    pub async fn expire_leases_held_by(
        pool: &PgPool,
        agent: &str,
        now: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE requests SET lease_expires_at = $2 \
             WHERE status = 'progress' AND locked_by = $1",
        )
        .bind(agent)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Request>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM requests WHERE id = $1");
        sqlx::query_as::<_, Request>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
