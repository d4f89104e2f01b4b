//! Plinth Telemetry - logging setup for the plugin installer.
//!
//! # Example
//!
//! ```rust,no_run
//! use plinth_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), plinth_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Json)
//!     .with_directive("plinth_installer=debug");
//!
//! setup_logging(&config)?;
//! tracing::info!("installer ready");
//! # Ok(())
//! # }
//! ```
//!
//! `RUST_LOG`, when set to a valid filter, replaces the configured level and
//! directives.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{
    FileRotation, LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging,
};
