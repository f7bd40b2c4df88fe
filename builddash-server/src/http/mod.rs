//! HTTP surface
//!
//! Axum server with:
//! - CORS (localhost dev origins by default)
//! - Request tracing
//! - Graceful shutdown
//! - JSON error responses

pub mod error;
pub mod extractors;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use extractors::{ApiJson, ApiPath};
pub use server::{build_router, run_server, AppState, ServerConfig};
