#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! # crestron-shades
//!
//! A Rust library for polling and controlling Crestron motorized shades
//! through the Crestron Home REST API.
//!
//! The hub exposes a small JSON API under `/cws/api`. A long-lived API token
//! configured on the hub is exchanged for a short-lived auth key, which then
//! authorizes every other call. This crate wraps that session handling and
//! builds a polling layer on top of it:
//!
//! - [`HubClient`] issues the HTTP requests and re-logs in once when the auth
//!   key expires
//! - [`ShadeCoordinator`] refreshes shade state on an interval, keeps the last
//!   good snapshot and tracks auth failures, stale data and operator issues
//! - [`ShadeEntity`] presents one shade as a [`Cover`] with open, close, stop
//!   and set-position support
//!
//! Positions are always 0 (closed) to 100 (open) at the library boundary; the
//! hub's raw 0-65535 scale only appears in [`protocol`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use crestron_shades::{Cover, HubConfig, ShadeCoordinator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HubConfig::new("192.168.1.20", "my-api-token");
//!     let coordinator = Arc::new(ShadeCoordinator::connect(config).await?);
//!     coordinator.start().await;
//!
//!     for shade in coordinator.entities() {
//!         println!("{}: {:?}%", shade.name(), shade.current_position());
//!         shade.set_cover_position(50).await?;
//!     }
//!
//!     coordinator.shutdown().await;
//!     Ok(())
//! }
//! ```

/// HTTP client for the hub REST API
pub mod client;
/// Polling coordinator and shade commands
pub mod coordinator;
/// Error types and handling
pub mod error;
/// Wire format: paths, headers, bodies and position scaling
pub mod protocol;
/// Cover entities
pub mod shade;
/// Type definitions and data structures
pub mod types;

#[cfg(test)]
mod testing;

// Re-export the main types for convenient usage
pub use client::{with_retry, HubClient, ShadeApi};
pub use coordinator::{Diagnostics, ShadeCoordinator};
pub use error::{CrestronError, Result};
pub use shade::{Cover, CoverFeatures, ShadeAttributes, ShadeEntity};
pub use types::{
    ConnectionStatus, CoordinatorState, Device, HubConfig, HubIssue, PollSnapshot, Room, Shade,
    ShadeCommand, TimeoutConfig,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
