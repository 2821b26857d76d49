//! Inbound frame validation.
//!
//! Frame types themselves live in `livefeed_core::protocol` so the client can
//! share them.

pub mod validator;

pub use validator::validate_inbound;
