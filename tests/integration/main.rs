//! Integration tests for the LiveFeed server and client.

mod helpers;

mod auth_test;
mod client_test;
mod ws_test;
