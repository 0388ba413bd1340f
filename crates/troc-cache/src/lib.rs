//! Storage for the troc gateway
//!
//! This crate provides the two stores every registry owns: the append-only
//! auth logs (users, tokens, sessions) and the package store holding
//! `info.json` documents and immutable tarballs.

pub mod log;
pub mod package;

// Re-export main types
pub use log::{CacheCollection, LoadOutcome, RegistryCache, SessionData, TokenData, UserData};
pub use package::{merge_info, rewrite_tarball_urls, stamp_npm_user, stamp_publish_time, PackageStore, PkgPath};

use troc_core::error::TrocError;

/// Result type for cache operations
pub type CacheResult<T> = Result<T, TrocError>;
