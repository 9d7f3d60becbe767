//! VideoGenie job status client.
//!
//! The browser-side half of the job status channel, for Rust consumers:
//!
//! - [`source`]: opening a status channel for one job ([`WsStatusSource`]
//!   behind the [`StatusSource`] seam).
//! - [`manager`]: [`SubscriptionManager`], which keeps at most one channel
//!   open and exposes the latest status it received.

pub mod error;
pub mod manager;
pub mod source;

pub use error::ClientError;
pub use manager::{StatusSnapshot, SubscriptionManager, PLACEHOLDER_STATUS};
pub use source::{to_ws_url, StatusChannel, StatusSource, WsStatusSource};
