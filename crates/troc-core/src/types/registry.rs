//! Logical registries and their upstream proxy lists.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;

use super::key::RegistryType;
use crate::error::{TrocError, TrocResult};

/// Anything that can accept or reject a proxy candidate key such as
/// `/install/@scope/name`
pub trait Matcher {
    fn matches(&self, key: &str) -> bool;
}

/// Regex matched against the whole candidate key
#[derive(Clone)]
pub struct PathPattern {
    source: String,
    regex: Regex,
}

impl PathPattern {
    /// Compile a pattern; it is anchored at both ends
    pub fn new(pattern: &str) -> TrocResult<Self> {
        let regex = Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| TrocError::ConfigValidation {
            field: "pattern".to_string(),
            reason: format!("invalid pattern '{}': {}", pattern, e),
        })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl Matcher for PathPattern {
    fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }
}

impl fmt::Debug for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PathPattern").field(&self.source).finish()
    }
}

impl PartialEq for PathPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// One upstream registry and the request keys it may serve
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyConfig {
    /// Upstream base URL without a trailing slash
    pub url: String,
    pub include: Vec<PathPattern>,
    pub exclude: Vec<PathPattern>,
}

impl ProxyConfig {
    pub fn new(url: &str, include: Vec<PathPattern>, exclude: Vec<PathPattern>) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            include,
            exclude,
        }
    }

    /// An empty include list never matches
    pub fn accepts(&self, key: &str) -> bool {
        self.include.iter().any(|p| p.matches(key)) && !self.exclude.iter().any(|p| p.matches(key))
    }
}

/// A logical registry served under a path prefix
#[derive(Debug, Clone, PartialEq)]
pub struct Registry {
    /// "" for the root registry, otherwise `/segment[/segment...]`
    pub path_prefix: String,
    pub storage_dir: Utf8PathBuf,
    pub proxies: Vec<ProxyConfig>,
}

impl Registry {
    pub fn new(path_prefix: &str, storage_dir: impl Into<Utf8PathBuf>, proxies: Vec<ProxyConfig>) -> Self {
        Self {
            path_prefix: normalize_prefix(path_prefix),
            storage_dir: storage_dir.into(),
            proxies,
        }
    }

    /// A registry without upstreams is the authoritative store
    pub fn is_local(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn registry_type(&self) -> RegistryType {
        if self.is_local() {
            RegistryType::Local
        } else {
            RegistryType::Proxy
        }
    }

    pub fn storage_dir(&self) -> &Utf8Path {
        &self.storage_dir
    }

    /// Whether `registry_path` lives under this registry's prefix, on a
    /// segment boundary
    pub fn owns(&self, registry_path: &str) -> bool {
        if self.path_prefix.is_empty() {
            return true;
        }
        match registry_path.strip_prefix(self.path_prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

/// Find the registry with the longest prefix owning `registry_path`
pub fn find_registry<'a>(registries: &'a [Registry], registry_path: &str) -> Option<&'a Registry> {
    registries
        .iter()
        .filter(|r| r.owns(registry_path))
        .max_by_key(|r| r.path_prefix.len())
}

/// Leading slash, no trailing slash, "" for root
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}
