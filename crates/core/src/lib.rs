//! Pure domain logic shared by the dispatcher and the agent runtime.
//!
//! Nothing in this crate touches the database or the network. The
//! store-facing crates convert their rows into the types defined here
//! before calling into the scoring, compatibility, dialog and heartbeat
//! rules.

pub mod chat;
pub mod compat;
pub mod dialog;
pub mod env;
pub mod error;
pub mod heartbeat;
pub mod resources;
pub mod scoring;
pub mod shutdown;
pub mod status;
pub mod types;
