//! Logging facade for vstat.
//!
//! # Setup
//!
//! To enable logging, invoke the [`init`] function with a [`LogConfig`]. The configuration
//! implements `serde` traits, so it can be obtained from configuration files. Initialization
//! requires the `init` feature.
//!
//! ```ignore
//! let config = vstat_log::LogConfig {
//!     level: vstat_log::LogLevel::Debug,
//!     ..Default::default()
//! };
//!
//! vstat_log::init(&config);
//! ```
//!
//! # Logging
//!
//! The basic use of this crate is through the five logging macros: [`error!`], [`warn!`],
//! [`info!`], [`debug!`] and [`trace!`] where `error!` represents the highest-priority log messages
//! and `trace!` the lowest. Each of these macros accept format strings similarly to [`println!`]
//! and structured fields like the macros of `tracing`.
//!
//! ## Conventions
//!
//! Log messages should start lowercase and end without punctuation. Prefer short and precise log
//! messages over verbose text. Choose the log level according to these rules:
//!
//! - [`error!`] for bugs and invalid behavior.
//! - [`warn!`] for undesirable behavior, such as a metric running into its dimension guardrail.
//! - [`info!`] for messages relevant to the average user.
//! - [`debug!`] for messages usually relevant to debugging.
//! - [`trace!`] for full auxiliary information, such as every sample passing through a metric.
//!
//! ## Logging Error Types
//!
//! To log errors with their full chain of sources, pass them as a `dyn Error` field:
//!
//! ```
//! use std::io::{Error, ErrorKind};
//!
//! let error = Error::new(ErrorKind::TimedOut, "data source did not answer");
//! vstat_log::warn!(tag = 10_000, error = &error as &dyn std::error::Error, "failed to pull samples");
//! ```
//!
//! # Testing
//!
//! Tests call [`init_test!`] first to route logs of the calling crate and the pull layer into the
//! test output. It requires the `test` feature.
//!
//! ```ignore
//! #[test]
//! fn test_something() {
//!     vstat_log::init_test!();
//! }
//! ```

#![warn(missing_docs)]

#[cfg(feature = "init")]
mod setup;
#[cfg(feature = "init")]
pub use setup::*;

#[cfg(feature = "test")]
pub use test::*;

mod utils;
pub use utils::*;

// Expose the minimal log facade.
#[doc(inline)]
pub use tracing::{Level, debug, error, info, trace, warn};
