//! Append-only auth logs
//!
//! Users, tokens and sessions of every registry are kept in memory and
//! persisted as append-only logs in the registry's storage directory.

pub mod collection;
pub mod records;

pub use collection::{CacheCollection, LoadOutcome};
pub use records::{normalize_upstream, RegistryCache, SessionData, TokenData, UserData};
