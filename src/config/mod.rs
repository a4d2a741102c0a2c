//! Configuration loading and management.
//!
//! - [`types`]: Config struct definitions and TOML loading
//! - [`defaults`]: serde default value functions
//! - [`validation`]: startup checks that report every problem at once

mod defaults;
mod types;
pub mod validation;

pub use types::{AuthorityConfig, Config, ConfigError, GrantConfig, ServerConfig};
pub use validation::{ValidationError, validate};
