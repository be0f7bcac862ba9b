//! Request lifecycle status and the transition graph.
//!
//! The only legal path is `new -> queued -> progress -> {solved, error}`.
//! Every mutation in the store is guarded by the expected source status,
//! so a request can never move backwards or re-enter a state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Lifecycle status of an inference request.
///
/// Stored as lowercase text in the `requests.status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Inserted by the front-end, not yet matched.
    New,
    /// Matched to a prompt template, a model and an agent.
    Queued,
    /// Claimed by exactly one agent runtime.
    Progress,
    /// Finished with a response (possibly the inference failure sentinel).
    Solved,
    /// Claimed but could not be executed.
    Error,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 5] = [
        RequestStatus::New,
        RequestStatus::Queued,
        RequestStatus::Progress,
        RequestStatus::Solved,
        RequestStatus::Error,
    ];

    /// Text representation used in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::New => "new",
            RequestStatus::Queued => "queued",
            RequestStatus::Progress => "progress",
            RequestStatus::Solved => "solved",
            RequestStatus::Error => "error",
        }
    }

    /// Terminal statuses are never left again.
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Solved | RequestStatus::Error)
    }

    /// Whether `self -> next` is an edge of the lifecycle graph.
    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        matches!(
            (self, next),
            (RequestStatus::New, RequestStatus::Queued)
                | (RequestStatus::Queued, RequestStatus::Progress)
                | (RequestStatus::Progress, RequestStatus::Solved)
                | (RequestStatus::Progress, RequestStatus::Error)
        )
    }

    /// Position along the lifecycle; terminal states share the last rank.
    fn rank(self) -> u8 {
        match self {
            RequestStatus::New => 0,
            RequestStatus::Queued => 1,
            RequestStatus::Progress => 2,
            RequestStatus::Solved | RequestStatus::Error => 3,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown request status '{s}'")))
    }
}

impl TryFrom<String> for RequestStatus {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, CoreError> {
        value.parse()
    }
}

/// Check that an observed sequence of statuses only moves forward along the
/// lifecycle and contains at most one terminal state.
///
/// Skipped intermediate states are allowed (an observer polling the store
/// may miss a short-lived `progress`), but no status may repeat and no
/// edge may point backwards.
pub fn is_forward_path(observed: &[RequestStatus]) -> bool {
    observed
        .windows(2)
        .all(|pair| pair[0].rank() < pair[1].rank())
}
