//! # troc-core
//!
//! Core types and utilities shared across all troc crates.
//!
//! This crate provides:
//! - The request path classifier and dispatch keys
//! - Registry and upstream proxy configuration types
//! - TrocError enum for unified error handling
//! - Path safety and credential hashing helpers
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `types`: Core data types (ParsedUrl, RequestKey, Registry, etc.)
//! - `error`: Error types and result aliases
//! - `utils`: Utility functions and helpers

pub mod error;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use error::{TrocError, TrocResult};
pub use types::{
    ApiOwner, Matcher, NpmCommand, ParsedUrl, PathPattern, PkgAction, ProxyConfig, Registry, RegistryType,
    RequestKey,
};
