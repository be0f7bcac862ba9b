//! The coordination seam between the dispatcher and the agent runtimes.
//!
//! Every mutation is a guarded update scoped to one key: it either applies
//! completely or reports that the guard no longer held. Callers treat a
//! `false`/`None` result as a lost race, never as an error.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use relay_core::chat::Exchange;
use relay_core::dialog::LatestSolved;
use relay_core::types::{DbId, Timestamp};

use crate::models::agent_status::{AgentStatus, AgentStatusUpsert};
use crate::models::model_spec::ModelSpec;
use crate::models::prompt_template::PromptTemplate;
use crate::models::request::{Assignment, Claim, Completion, NewRequest, Request};
use crate::models::transition::NewTransition;
use crate::StoreError;

#[async_trait]
pub trait SharedStore: Send + Sync {
    // ── Front-end contract ───────────────────────────────────────────────

    /// Insert a `new`, unassigned request created at `now`.
    async fn submit_request(&self, input: &NewRequest, now: Timestamp) -> Result<Request, StoreError>;

    async fn undelivered_responses(&self, limit: i64) -> Result<Vec<Request>, StoreError>;

    /// Returns `false` if the response was already delivered.
    async fn mark_delivered(&self, request_id: DbId) -> Result<bool, StoreError>;

    // ── Dispatcher ───────────────────────────────────────────────────────

    /// `new` requests without an agent, oldest first.
    async fn pending_requests(&self) -> Result<Vec<Request>, StoreError>;

    /// Available agents with a heartbeat at or after `fresh_since`,
    /// ordered by CPU then memory load.
    async fn available_agents(&self, fresh_since: Timestamp) -> Result<Vec<AgentStatus>, StoreError>;

    /// Active dispatch (`pre`) templates in creation order.
    async fn active_prompt_templates(&self) -> Result<Vec<PromptTemplate>, StoreError>;

    async fn active_models(&self) -> Result<Vec<ModelSpec>, StoreError>;

    /// `new -> queued`, guarded on `status = new AND assigned_agent IS NULL`.
    async fn assign_request(&self, assignment: &Assignment) -> Result<bool, StoreError>;

    async fn mark_stale_agents_unavailable(&self, stale_before: Timestamp) -> Result<u64, StoreError>;

    // ── Agent runtime ────────────────────────────────────────────────────

    /// Oldest request `agent` may claim at `now`: its own queued work, or
    /// any `progress` row whose lease has expired.
    async fn next_claimable(&self, agent: &str, now: Timestamp) -> Result<Option<Request>, StoreError>;

    async fn latest_solved_for_user(&self, user_id: DbId) -> Result<Option<LatestSolved>, StoreError>;

    /// Move a claimable request to `progress` under a lease.
    async fn claim_request(&self, claim: &Claim) -> Result<Option<Request>, StoreError>;

    async fn prompt_template(&self, id: DbId) -> Result<Option<PromptTemplate>, StoreError>;

    /// Solved exchanges of a dialog in chronological order.
    async fn dialog_history(&self, dialog_id: &str) -> Result<Vec<Exchange>, StoreError>;

    /// `progress -> solved`, guarded on `locked_by = agent`.
    async fn complete_request(&self, completion: &Completion) -> Result<bool, StoreError>;

    /// `progress -> error`, guarded on `locked_by = agent`.
    async fn fail_request(
        &self,
        request_id: DbId,
        agent: &str,
        error: &str,
        now: Timestamp,
    ) -> Result<bool, StoreError>;

    /// Expire the leases `agent` holds, making its abandoned work claimable.
    async fn expire_own_leases(&self, agent: &str, now: Timestamp) -> Result<u64, StoreError>;

    async fn upsert_agent_status(&self, status: &AgentStatusUpsert, now: Timestamp) -> Result<(), StoreError>;

    /// Refresh `last_heartbeat` only. Returns `false` if the agent has no row.
    async fn touch_heartbeat(&self, agent: &str, now: Timestamp) -> Result<bool, StoreError>;

    // ── Audit ────────────────────────────────────────────────────────────

    async fn record_transition(&self, transition: &NewTransition, now: Timestamp) -> Result<(), StoreError>;
}
