//! Core data types for the troc gateway.
//!
//! This module provides the request-scoped and configuration types shared
//! by every crate in the workspace:
//! - URL classification (`ParsedUrl`)
//! - Dispatch keys (`RequestKey` and its axes)
//! - Registries and upstream proxy configs

pub mod key;
pub mod registry;
pub mod url;

// Re-export all public types
pub use key::{build_key, NpmCommand, PkgAction, RegistryType, RequestKey};
pub use registry::{find_registry, normalize_prefix, Matcher, PathPattern, ProxyConfig, Registry};
pub use url::{parse_url, ApiOwner, ParsedUrl};
