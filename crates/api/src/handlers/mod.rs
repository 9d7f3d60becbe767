//! Request handlers.
//!
//! Handlers stay thin: they parse the request, hand off to the hub or the
//! metrics sink held in [`AppState`](crate::state::AppState), and map errors
//! via [`AppError`](crate::error::AppError).

pub mod jobs;
pub mod metrics;
