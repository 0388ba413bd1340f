//! Request path classification.
//!
//! npm clients address packages, tarballs and auth endpoints through a small
//! set of overlapping URL shapes, optionally behind a registry path prefix.
//! [`ParsedUrl::parse`] tries each shape in a fixed precedence order, most
//! specific first, and records which fields the winning shape captured.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;

/// Owner of an API endpoint path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiOwner {
    /// npm's own `/-/...` endpoints
    Npm,
    /// Gateway endpoints under `/-/troc/vN`
    Troc,
    #[default]
    Unknown,
}

impl ApiOwner {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiOwner::Npm => "npm",
            ApiOwner::Troc => "troc",
            ApiOwner::Unknown => "unknown",
        }
    }
}

/// Semantic fields extracted from a raw request path
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ParsedUrl {
    /// Everything before the package or API part, "" for the root registry
    pub registry_path: String,
    /// Package scope including the leading `@`
    pub pkg_scope: Option<String>,
    pub pkg_name: Option<String>,
    pub tarball_version: Option<String>,
    pub api_owner: ApiOwner,
    pub api_version: Option<String>,
    pub api_path: Option<String>,
}

static TARBALL_SCOPED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<registry>.*?)/(?P<scope>@[^/]+)/(?P<name>[^/@][^/]*)/-/(?P<file>[^/]+)\.tgz$")
        .expect("tarball-with-scope pattern")
});

static TARBALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<registry>.*?)/(?P<name>[^/@\-][^/]*)/-/(?P<file>[^/]+)\.tgz$")
        .expect("tarball pattern")
});

static NPM_AUTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<registry>.*?)/-/(?P<path>whoami|user/org\.couchdb\.user:[^/]+|user/token/[^/]+)$")
        .expect("npm auth pattern")
});

static NPM_API: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<registry>.*?)/-/npm/(?P<version>v\d+)/(?P<path>.+)$").expect("npm api pattern")
});

static TROC_API: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<registry>.*?)/(?:-/troc|api)/(?P<version>v\d+)/(?P<path>.+)$")
        .expect("troc api pattern")
});

static PACKAGE_SCOPED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<registry>.*?)/(?P<scope>@[^/]+)/(?P<name>[^/@][^/]*)/?$")
        .expect("scoped package pattern")
});

static PACKAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<registry>.*?)/(?P<name>[^/@\-][^/]*)/?$").expect("package pattern")
});

impl ParsedUrl {
    /// Classify a raw request path. Never fails: an unrecognised path yields
    /// a value with every field empty.
    pub fn parse(raw_path: &str) -> Self {
        let path = normalize_raw_path(raw_path);

        if let Some(caps) = package_captures(&TARBALL_SCOPED, &path) {
            return Self::tarball(&caps);
        }
        if let Some(caps) = package_captures(&TARBALL, &path) {
            return Self::tarball(&caps);
        }
        if let Some(caps) = NPM_AUTH.captures(&path) {
            return Self::api(&caps, ApiOwner::Npm);
        }
        if let Some(caps) = NPM_API.captures(&path) {
            return Self::api(&caps, ApiOwner::Npm);
        }
        if let Some(caps) = TROC_API.captures(&path) {
            return Self::api(&caps, ApiOwner::Troc);
        }
        if let Some(caps) = package_captures(&PACKAGE_SCOPED, &path) {
            return Self::package(&caps);
        }
        if let Some(caps) = package_captures(&PACKAGE, &path) {
            return Self::package(&caps);
        }

        Self::default()
    }

    fn package(caps: &Captures<'_>) -> Self {
        Self {
            registry_path: capture(caps, "registry").unwrap_or_default(),
            pkg_scope: capture(caps, "scope"),
            pkg_name: capture(caps, "name"),
            ..Self::default()
        }
    }

    fn tarball(caps: &Captures<'_>) -> Self {
        let mut parsed = Self::package(caps);
        if let (Some(name), Some(file)) = (parsed.pkg_name.as_deref(), caps.name("file")) {
            // "<name>-<version>" with ".tgz" already stripped by the pattern
            let file = file.as_str();
            let version = file
                .strip_prefix(name)
                .and_then(|rest| rest.strip_prefix('-'))
                .unwrap_or(file);
            parsed.tarball_version = Some(version.to_string());
        }
        parsed
    }

    fn api(caps: &Captures<'_>, owner: ApiOwner) -> Self {
        Self {
            registry_path: capture(caps, "registry").unwrap_or_default(),
            api_owner: owner,
            api_version: capture(caps, "version"),
            api_path: capture(caps, "path"),
            ..Self::default()
        }
    }

    /// Whether the path addresses a package document or tarball
    pub fn is_package(&self) -> bool {
        self.pkg_name.is_some()
    }

    /// Whether the path addresses an API endpoint
    pub fn is_api(&self) -> bool {
        self.api_owner != ApiOwner::Unknown
    }

    /// Full package name, `@scope/name` or `name`
    pub fn package_id(&self) -> Option<String> {
        let name = self.pkg_name.as_deref()?;
        Some(match self.pkg_scope.as_deref() {
            Some(scope) => format!("{}/{}", scope, name),
            None => name.to_string(),
        })
    }

    /// Path of the request with the registry prefix removed, as it would be
    /// requested from an upstream registry
    pub fn upstream_path(&self) -> Option<String> {
        let name = self.pkg_name.as_deref()?;
        let scope = self.pkg_scope.as_deref();
        Some(match (scope, self.tarball_version.as_deref()) {
            (Some(scope), Some(version)) => format!("/{}/{}/-/{}-{}.tgz", scope, name, name, version),
            (None, Some(version)) => format!("/{}/-/{}-{}.tgz", name, name, version),
            (Some(scope), None) => format!("/{}%2f{}", scope, name),
            (None, None) => format!("/{}", name),
        })
    }
}

/// Classify a raw request path
pub fn parse_url(raw_path: &str) -> ParsedUrl {
    ParsedUrl::parse(raw_path)
}

/// Package shapes never sit below a `/-/` segment, which is reserved for
/// endpoints like `/-/whoami`
fn package_captures<'p>(pattern: &Regex, path: &'p str) -> Option<Captures<'p>> {
    pattern.captures(path).filter(|caps| {
        caps.name("registry")
            .map_or(true, |registry| !registry.as_str().split('/').any(|segment| segment == "-"))
    })
}

fn capture(caps: &Captures<'_>, group: &str) -> Option<String> {
    caps.name(group)
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Drop the query string and decode the escapes npm uses in scoped names
fn normalize_raw_path(raw_path: &str) -> String {
    let path = raw_path.split(['?', '#']).next().unwrap_or_default();
    path.replace("%2f", "/")
        .replace("%2F", "/")
        .replace("%40", "@")
}
