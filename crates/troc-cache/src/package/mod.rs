//! Package documents and tarballs
//!
//! This module provides the on-disk [`PackageStore`] and the pure document
//! operations used around it: publish merging and tarball URL rewriting.

pub mod document;
pub mod store;

pub use document::{
    deep_merge, merge_info, rewrite_tarball_urls, stamp_npm_user, stamp_publish_time, strip_attachments, tarball_file_name,
};
pub use store::{PackageStore, PkgPath, INFO_FILE, PACKAGES_DIR};
