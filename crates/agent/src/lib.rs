//! Worker-side runtime: claims requests queued for this agent, runs them
//! against the local inference engine and publishes heartbeats.

pub mod config;
pub mod heartbeat;
pub mod inference;
pub mod probe;
pub mod runtime;
