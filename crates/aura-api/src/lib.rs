//! Axum HTTP API server.
//!
//! This crate provides:
//! - Multipart job submission for videos and single images
//! - The progress WebSocket and its live-connection registry
//! - HS256 socket authentication
//! - Prometheus metrics

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod ws;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
pub use ws::LiveConnections;
