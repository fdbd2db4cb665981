//! Axum HTTP API server.
//!
//! This crate provides:
//! - REST endpoints for job submission, status, listing and cancellation
//! - A WebSocket stream of per-job progress events
//! - Queue statistics and health endpoints

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod ws;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
