//! Job status channel over WebSocket.
//!
//! Provides the connection registry, keepalive heartbeat, and the HTTP
//! upgrade handler used by Axum routes.

mod handler;
mod heartbeat;
pub mod manager;

pub use handler::status_channel;
pub use heartbeat::start_heartbeat;
pub use manager::ChannelRegistry;
