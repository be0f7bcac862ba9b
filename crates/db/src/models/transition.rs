//! Append-only audit log of request status changes.

use relay_core::error::CoreError;
use relay_core::status::RequestStatus;
use relay_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use crate::StoreError;

/// A row from the `request_transitions` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct RequestTransition {
    pub id: DbId,
    pub request_id: DbId,
    pub from_status: Option<String>,
    pub to_status: String,
    pub agent_name: Option<String>,
    pub detail: Option<String>,
    pub recorded_at: Timestamp,
}

impl RequestTransition {
    pub fn to(&self) -> Result<RequestStatus, CoreError> {
        self.to_status.parse()
    }
}

/// DTO for appending one transition.
#[derive(Debug, Clone)]
pub struct NewTransition {
    pub request_id: DbId,
    /// `None` for the initial insert.
    pub from_status: Option<RequestStatus>,
    pub to_status: RequestStatus,
    pub agent_name: Option<String>,
    pub detail: Option<String>,
}

impl NewTransition {
    /// Reject edges outside the request lifecycle. Only the initial row,
    /// which has no source status, may point at `new`.
    pub fn check_edge(&self) -> Result<(), StoreError> {
        let legal = match self.from_status {
            Some(from) => from.can_transition_to(self.to_status),
            None => self.to_status == RequestStatus::New,
        };
        if legal {
            Ok(())
        } else {
            Err(StoreError::Invariant(format!(
                "illegal transition {} -> {} for request {}",
                self.from_status.map_or("none", RequestStatus::as_str),
                self.to_status,
                self.request_id
            )))
        }
    }
}
