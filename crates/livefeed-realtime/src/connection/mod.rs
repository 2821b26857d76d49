//! Connection management: lifecycle, pool, handles, heartbeat, auth.

pub mod authenticator;
pub mod handle;
pub mod heartbeat;
pub mod pool;
pub mod registry;

pub use authenticator::TokenAuthenticator;
pub use handle::{ConnectionHandle, ConnectionState};
pub use heartbeat::HeartbeatSweep;
pub use registry::{AcceptedConnection, ConnectionRegistry};
