//! Plinth Test - Shared test utilities for the plugin installer.
//!
//! Provides archive builders, registry JSON fixtures, and a mock registry
//! server for use as a dev-dependency.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! plinth-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use plinth_test::{MockRegistry, plugin_archive};
//!
//! #[tokio::test]
//! async fn installs_latest() {
//!     let registry = MockRegistry::start().await;
//!     registry
//!         .publish_plugin("clock-panel", "1.0.0", plugin_archive("clock-panel", "1.0.0", &[]))
//!         .await;
//!     // point an installer at registry.url() ...
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod archive;
pub mod fixtures;
pub mod harness;
pub mod registry;

pub use archive::ZipFixture;
pub use fixtures::*;
pub use harness::*;
pub use registry::MockRegistry;
