//! Structured logging, with optional OpenTelemetry trace export.
//!
//! # Telemetry invariants
//!
//! - Passwords, session identifiers and cookie values never appear in a span
//!   attribute or log field. User ids may.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`); `RUST_LOG`
//!   takes precedence when set.

pub mod init;

pub use init::{init_telemetry, shutdown_telemetry};
