//! shelfd - a small books API server with per-client request admission
//! control, rolling request metrics, and a scalability self-assessment.
//!
//! The library surface exists for the binary, the benchmarks, and tests;
//! shelfd is not published as a general-purpose crate.

pub mod admission;
pub mod api;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod telemetry;
