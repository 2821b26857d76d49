//! Server-side refresh token registry.

pub mod store;

pub use store::{RefreshRecord, RefreshTokenStore};
