//! Utility functions and helpers.
//!
//! Common functionality used across multiple troc crates.

pub mod hash;
pub mod path;

// Re-export commonly used utilities
pub use hash::{generate_token, hash_password, verify_password, verify_tarball_integrity};
pub use path::{is_safe_segment, safe_join};
