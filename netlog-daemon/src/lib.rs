//! netlog daemon library.
//!
//! Exposes the daemon's building blocks for integration testing.
//! In production `netlog-daemon` runs as a binary (main.rs).

pub mod cli;
pub mod health;
pub mod logging;
pub mod metrics_server;
pub mod orchestrator;
