//! Dialog continuation rules.
//!
//! A dialog is a time-bounded sequence of requests from one user. A new
//! request continues the user's latest dialog when that dialog's most
//! recent solved request is younger than the lookback window.

use std::time::Duration;

use crate::types::Timestamp;

/// Default lookback window for continuing a dialog.
pub const DEFAULT_DIALOG_WINDOW: Duration = Duration::from_secs(15 * 60);

/// How a request's dialog id was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogResolution {
    /// The front-end already attached a dialog id to the request.
    Provided(String),
    /// Continues the user's latest dialog.
    Continued(String),
    /// A fresh dialog id was minted.
    Started(String),
}

impl DialogResolution {
    pub fn dialog_id(&self) -> &str {
        match self {
            DialogResolution::Provided(id)
            | DialogResolution::Continued(id)
            | DialogResolution::Started(id) => id,
        }
    }
}

/// The user's most recent solved request that carries a dialog id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestSolved {
    pub dialog_id: String,
    pub created_at: Timestamp,
}

/// Decide the dialog id for a request that is about to be claimed.
///
/// `latest` must be the user's most recent solved request; requests of
/// other users are never considered.
pub fn resolve(
    provided: Option<&str>,
    latest: Option<&LatestSolved>,
    now: Timestamp,
    window: Duration,
) -> DialogResolution {
    if let Some(id) = provided.map(str::trim).filter(|id| !id.is_empty()) {
        return DialogResolution::Provided(id.to_string());
    }

    if let Some(latest) = latest {
        let age = now.signed_duration_since(latest.created_at);
        let within = age
            .to_std()
            .map(|age| age < window)
            // A timestamp slightly in the future (clock skew) counts as fresh.
            .unwrap_or(true);
        if within {
            return DialogResolution::Continued(latest.dialog_id.clone());
        }
    }

    DialogResolution::Started(uuid::Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{TimeZone, Utc};

    use super::*;

    fn at(minutes: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap() + chrono::Duration::minutes(minutes)
    }

    #[test]
    fn requests_ten_minutes_apart_share_a_dialog_twenty_do_not() {
        let first = resolve(None, None, at(0), DEFAULT_DIALOG_WINDOW);
        assert_matches!(first, DialogResolution::Started(_));

        let latest = LatestSolved {
            dialog_id: first.dialog_id().to_string(),
            created_at: at(0),
        };
        let second = resolve(None, Some(&latest), at(10), DEFAULT_DIALOG_WINDOW);
        assert_eq!(second, DialogResolution::Continued(first.dialog_id().to_string()));

        let latest = LatestSolved {
            dialog_id: second.dialog_id().to_string(),
            created_at: at(10),
        };
        let third = resolve(None, Some(&latest), at(30), DEFAULT_DIALOG_WINDOW);
        assert_matches!(third, DialogResolution::Started(_));
        assert_ne!(third.dialog_id(), first.dialog_id());
    }

    #[test]
    fn provided_dialog_id_wins() {
        let latest = LatestSolved {
            dialog_id: "old".to_string(),
            created_at: at(0),
        };
        let resolved = resolve(Some("chosen"), Some(&latest), at(1), DEFAULT_DIALOG_WINDOW);
        assert_eq!(resolved, DialogResolution::Provided("chosen".to_string()));
    }

    #[test]
    fn blank_provided_id_is_ignored() {
        let resolved = resolve(Some("  "), None, at(0), DEFAULT_DIALOG_WINDOW);
        assert_matches!(resolved, DialogResolution::Started(_));
    }

    #[test]
    fn future_timestamp_counts_as_fresh() {
        let latest = LatestSolved {
            dialog_id: "skewed".to_string(),
            created_at: at(5),
        };
        let resolved = resolve(None, Some(&latest), at(0), DEFAULT_DIALOG_WINDOW);
        assert_eq!(resolved, DialogResolution::Continued("skewed".to_string()));
    }
}
