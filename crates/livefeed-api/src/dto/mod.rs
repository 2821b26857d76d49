//! Request and response bodies for the REST endpoints.

pub mod request;
pub mod response;

pub use request::RefreshRequest;
pub use response::{ApiResponse, HealthResponse};
