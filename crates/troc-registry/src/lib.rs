//! Upstream side of the troc npm gateway
//!
//! This crate provides the HTTP client used to reach upstream registries,
//! the resolver that picks which upstreams may serve a request, and the
//! npm document types the gateway decodes from publish payloads.

pub mod api;
pub mod client;
pub mod resolver;

// Re-export main types
pub use api::{split_package_name, Attachment, DistInfo, PublishPayload, PublishedTarball, VersionManifest};
pub use client::{forwardable_headers, upstream_url, ClientConfig, UpstreamClient, UpstreamRequest, UpstreamResponse};
pub use resolver::{candidate_key, get_proxy_urls};

use troc_core::error::TrocError;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, TrocError>;
