//! Bridges between store writers and the real-time engine.

pub mod change_feed;

pub use change_feed::{ChangeFeed, spawn_dispatch_loop};
