//! Axum HTTP server for the fftb job dealer.
//!
//! This crate provides:
//! - The dealer's segment routes for publishers and performers
//! - Order routes backed by the contracter
//! - Authority keys and short-lived session tokens
//! - Problem-details error bodies, rate limiting and Prometheus metrics

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use auth::{Caller, TokenIssuer};
pub use config::{ApiConfig, RegistryBackend, StorageBackend};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
