//! Shared domain types for the VideoGenie job-status and metrics services.
//!
//! Everything here is pure logic with no I/O so that the hub, the sink,
//! the HTTP layer and the client can all agree on one wire shape.

pub mod error;
pub mod job;
pub mod metrics;
pub mod types;
