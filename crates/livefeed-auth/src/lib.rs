//! # livefeed-auth
//!
//! Token service for the LiveFeed real-time layer.
//!
//! ## Modules
//!
//! - `jwt`: claims, HS256 signing, and allow-listed verification
//! - `refresh`: server-side registry of single-use refresh tokens
//! - `service`: issue / verify / rotate / revoke operations
//! - `sweeper`: periodic purge of expired registry entries

pub mod error;
pub mod jwt;
pub mod refresh;
pub mod service;
pub mod sweeper;

pub use error::TokenError;
pub use jwt::{Claims, JwtDecoder, JwtEncoder, TokenType};
pub use refresh::RefreshTokenStore;
pub use service::{SweepStats, TokenPair, TokenService};
pub use sweeper::spawn_sweeper;
