//! Configuration parsing for the troc gateway
//!
//! This crate handles parsing and validation of `troc.toml`, layering
//! environment overrides on top, and producing the validated
//! [`GatewayConfig`] the server is started with.

pub mod toml;
pub mod merge;

// Re-export main types
pub use self::toml::{GatewayConfig, ProxySection, RegistrySection, ServerSection, ServerSettings, TrocToml};
pub use self::merge::{ConfigLayering, ConfigLoader, ConfigSource};

use troc_core::error::TrocError;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, TrocError>;
