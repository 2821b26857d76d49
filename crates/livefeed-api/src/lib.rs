//! # livefeed-api
//!
//! HTTP surface for LiveFeed built on Axum.
//!
//! Provides the WebSocket upgrade endpoint, token refresh and revocation
//! endpoints, a health check, middleware (CORS, request logging), and error
//! mapping.

pub mod app;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use app::{build_app, run_server, serve};
pub use state::AppState;
