//! VideoGenie job status relay.
//!
//! This crate is the server half of the job status channel:
//!
//! - [`JobStatusHub`]: per-job listener registry. The renderer's status
//!   reports are published into it and relayed, in order, to every
//!   [`JobSubscription`] currently open for that job.
//! - [`retention`]: background sweep that forgets finished (and stalled) jobs once no
//!   one is listening.

pub mod hub;
pub mod retention;

pub use hub::{JobStatusHub, JobSubscription};
