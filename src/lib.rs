//! capauthd - capability delegation authority.
//!
//! Tracks delegated capabilities, pending capability requests and the grant
//! decisions that resolve them, behind a small JSON-over-HTTP control plane.

pub mod caps;
pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod telemetry;
