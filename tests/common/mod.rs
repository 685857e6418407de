//! Helpers shared by the integration tests.
//!
//! Provides utilities for spawning shelfd instances against temp-dir
//! configs and driving them over HTTP.

pub mod server;

#[allow(unused_imports)]
pub use server::TestServer;
