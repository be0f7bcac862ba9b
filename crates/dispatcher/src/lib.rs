//! The dispatcher: matches `new` requests to a prompt template, a catalog
//! model and a resource-compatible agent, and queues them for that agent.

pub mod config;
pub mod dispatcher;
pub mod matching;
