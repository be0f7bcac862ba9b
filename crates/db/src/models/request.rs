//! Inference request rows and the DTOs that mutate them.

use relay_core::status::RequestStatus;
use relay_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Entity structs (match database tables)
// ---------------------------------------------------------------------------

/// A row from the `requests` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Request {
    pub id: DbId,
    pub user_id: DbId,
    pub dialog_id: Option<String>,
    pub text: String,
    #[sqlx(try_from = "String")]
    pub status: RequestStatus,
    pub assigned_agent: Option<String>,
    pub assigned_prompt: Option<DbId>,
    pub model: Option<String>,
    pub locked_by: Option<String>,
    pub locked_at: Option<Timestamp>,
    pub lease_expires_at: Option<Timestamp>,
    pub response: Option<String>,
    pub error_message: Option<String>,
    pub delivered: bool,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
}

impl Request {
    /// Whether this row is a `progress` claim whose lease ran out at `now`.
    pub fn lease_expired(&self, now: Timestamp) -> bool {
        self.status == RequestStatus::Progress
            && self.lease_expires_at.is_some_and(|until| until <= now)
    }

    /// Whether `agent` may claim this row at `now`.
    ///
    /// Queued rows are claimable only by their assigned agent, and only
    /// while no other agent holds them. Expired progress leases are
    /// claimable by any agent.
    pub fn claimable_by(&self, agent: &str, now: Timestamp) -> bool {
        match self.status {
            RequestStatus::Queued => {
                self.assigned_agent.as_deref() == Some(agent)
                    && self.locked_by.as_deref().map_or(true, |holder| holder == agent)
            }
            RequestStatus::Progress => self.lease_expired(now),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// A request as inserted by the chat front-end.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRequest {
    pub user_id: DbId,
    pub text: String,
    /// Set when the front-end already knows the conversation.
    pub dialog_id: Option<String>,
}

/// Dispatcher decision for one `new` request.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub request_id: DbId,
    pub agent_name: String,
    pub prompt_id: DbId,
    pub model: String,
}

/// Agent runtime claim of one request.
#[derive(Debug, Clone)]
pub struct Claim {
    pub request_id: DbId,
    pub agent_name: String,
    pub dialog_id: String,
    pub now: Timestamp,
    pub lease_until: Timestamp,
}

/// Final response written by the agent holding the claim.
#[derive(Debug, Clone)]
pub struct Completion {
    pub request_id: DbId,
    pub agent_name: String,
    pub response: String,
    pub model: String,
    pub now: Timestamp,
}
