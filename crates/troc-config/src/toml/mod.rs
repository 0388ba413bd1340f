//! troc.toml configuration parsing and validation

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use troc_core::error::TrocError;
use troc_core::types::{PathPattern, ProxyConfig, Registry};

use crate::ConfigResult;

/// Complete troc.toml configuration, as written on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TrocToml {
    /// Listener and shared settings
    #[serde(default)]
    pub server: ServerSection,

    /// Logical registries, keyed by path prefix
    #[serde(default)]
    pub registries: Vec<RegistrySection>,
}

/// `[server]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    /// Socket address to listen on
    #[serde(default = "default_listen")]
    pub listen: String,

    /// HMAC key for password hashing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Timeout for a single upstream attempt
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,

    /// Scheme used when rewriting tarball URLs to point at the gateway
    #[serde(default = "default_public_scheme")]
    pub public_scheme: String,
}

/// `[[registries]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrySection {
    /// URL path prefix, "" for the root registry
    #[serde(default)]
    pub path_prefix: String,

    /// Storage root for users, tokens, sessions and packages
    pub storage_dir: String,

    /// Ordered upstreams; empty makes the registry local
    #[serde(default)]
    pub proxies: Vec<ProxySection>,
}

/// `[[registries.proxies]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxySection {
    pub url: String,

    #[serde(default)]
    pub include: Vec<String>,

    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            secret: None,
            upstream_timeout_secs: default_upstream_timeout_secs(),
            public_scheme: default_public_scheme(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:4873".to_string()
}

fn default_upstream_timeout_secs() -> u64 {
    30
}

fn default_public_scheme() -> String {
    "http".to_string()
}

/// Validated server settings
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub listen: SocketAddr,
    pub secret: String,
    pub upstream_timeout: Duration,
    pub public_scheme: String,
}

/// Validated gateway configuration the server runs with
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub server: ServerSettings,
    pub registries: Vec<Registry>,
}

/// Parse TOML string to TrocToml configuration
pub fn parse_troc_toml(content: &str) -> ConfigResult<TrocToml> {
    // First check syntax with toml_edit for positioned errors
    content
        .parse::<toml_edit::DocumentMut>()
        .map_err(|e| TrocError::TomlParse(format!("TOML syntax error: {}", e)))?;

    toml::from_str(content).map_err(|e| TrocError::TomlParse(format!("TOML parsing error: {}", e)))
}

/// Serialize TrocToml to TOML string
pub fn serialize_troc_toml(config: &TrocToml) -> ConfigResult<String> {
    toml::to_string_pretty(config).map_err(|e| TrocError::TomlParse(format!("TOML serialization error: {}", e)))
}

/// Load and parse troc.toml from file path
pub async fn load_from_file(path: &Utf8Path) -> ConfigResult<TrocToml> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| TrocError::io(format!("Failed to read {}", path), e))?;

    parse_troc_toml(&content).map_err(|e| match e {
        TrocError::TomlParse(msg) => TrocError::TomlParse(format!("In file {}: {}", path, msg)),
        other => other,
    })
}

/// Validate the raw configuration and convert it into runtime types.
/// Relative storage directories are resolved against `base_dir`.
pub fn validate_config(config: &TrocToml, base_dir: &Utf8Path) -> ConfigResult<GatewayConfig> {
    let server = validate_server(&config.server)?;

    if config.registries.is_empty() {
        return Err(invalid("registries", "at least one [[registries]] entry is required"));
    }

    let mut seen_prefixes = HashSet::new();
    let mut registries = Vec::with_capacity(config.registries.len());

    for (index, section) in config.registries.iter().enumerate() {
        let registry = validate_registry(index, section, base_dir)?;
        if !seen_prefixes.insert(registry.path_prefix.clone()) {
            return Err(invalid(
                &format!("registries[{}].path_prefix", index),
                &format!("duplicate prefix '{}'", registry.path_prefix),
            ));
        }
        registries.push(registry);
    }

    Ok(GatewayConfig { server, registries })
}

fn validate_server(section: &ServerSection) -> ConfigResult<ServerSettings> {
    let listen = section
        .listen
        .parse::<SocketAddr>()
        .map_err(|e| invalid("server.listen", &format!("'{}' is not a socket address: {}", section.listen, e)))?;

    let secret = match section.secret.as_deref() {
        Some(secret) if !secret.is_empty() => secret.to_string(),
        _ => return Err(invalid("server.secret", "a non-empty secret is required (or set TROC_SECRET)")),
    };

    if section.upstream_timeout_secs == 0 {
        return Err(invalid("server.upstream_timeout_secs", "must be greater than zero"));
    }

    if !matches!(section.public_scheme.as_str(), "http" | "https") {
        return Err(invalid(
            "server.public_scheme",
            &format!("'{}' must be http or https", section.public_scheme),
        ));
    }

    Ok(ServerSettings {
        listen,
        secret,
        upstream_timeout: Duration::from_secs(section.upstream_timeout_secs),
        public_scheme: section.public_scheme.clone(),
    })
}

fn validate_registry(index: usize, section: &RegistrySection, base_dir: &Utf8Path) -> ConfigResult<Registry> {
    if section.storage_dir.trim().is_empty() {
        return Err(invalid(&format!("registries[{}].storage_dir", index), "must not be empty"));
    }
    if section.path_prefix.split('/').any(|segment| segment == "-") {
        return Err(invalid(
            &format!("registries[{}].path_prefix", index),
            "the '-' segment is reserved for npm endpoints",
        ));
    }

    let storage_dir = base_dir.join(&section.storage_dir);

    let mut proxies = Vec::with_capacity(section.proxies.len());
    for (proxy_index, proxy) in section.proxies.iter().enumerate() {
        let field = format!("registries[{}].proxies[{}]", index, proxy_index);
        proxies.push(validate_proxy(&field, proxy)?);
    }

    Ok(Registry::new(&section.path_prefix, storage_dir, proxies))
}

fn validate_proxy(field: &str, section: &ProxySection) -> ConfigResult<ProxyConfig> {
    let url = url::Url::parse(&section.url)
        .map_err(|e| invalid(&format!("{}.url", field), &format!("'{}' is not a URL: {}", section.url, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(&format!("{}.url", field), "only http and https upstreams are supported"));
    }

    // An empty include list is legal but never matches; the catch-all
    // upstream has to say "/(.*)" explicitly
    let include = compile_patterns(&format!("{}.include", field), &section.include)?;
    let exclude = compile_patterns(&format!("{}.exclude", field), &section.exclude)?;

    Ok(ProxyConfig::new(&section.url, include, exclude))
}

fn compile_patterns(field: &str, patterns: &[String]) -> ConfigResult<Vec<PathPattern>> {
    patterns
        .iter()
        .map(|p| {
            PathPattern::new(p).map_err(|e| match e {
                TrocError::ConfigValidation { reason, .. } => invalid(field, &reason),
                other => other,
            })
        })
        .collect()
}

fn invalid(field: &str, reason: &str) -> TrocError {
    TrocError::ConfigValidation {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[server]
listen = "0.0.0.0:8080"
secret = "s3cret"
upstream_timeout_secs = 5

[[registries]]
storage_dir = "storage/root"

[[registries.proxies]]
url = "https://npm.internal.example/"
include = ["/install/@acme/(.*)"]

[[registries.proxies]]
url = "https://registry.npmjs.org"
include = ["/(.*)"]
exclude = ["/publish/(.*)"]

[[registries]]
path_prefix = "/private/"
storage_dir = "/var/lib/troc/private"
"#;

    #[test]
    fn test_parse_and_validate() {
        let raw = parse_troc_toml(FULL).unwrap();
        assert_eq!(raw.registries.len(), 2);
        assert_eq!(raw.server.public_scheme, "http");

        let config = validate_config(&raw, Utf8Path::new("/etc/troc")).unwrap();
        assert_eq!(config.server.listen.port(), 8080);
        assert_eq!(config.server.upstream_timeout, Duration::from_secs(5));

        let root = &config.registries[0];
        assert_eq!(root.path_prefix, "");
        assert_eq!(root.storage_dir, Utf8Path::new("/etc/troc/storage/root"));
        assert_eq!(root.proxies.len(), 2);
        assert_eq!(root.proxies[0].url, "https://npm.internal.example");
        assert!(root.proxies[1].accepts("/install/left-pad"));
        assert!(!root.proxies[1].accepts("/publish/left-pad"));

        let private = &config.registries[1];
        assert_eq!(private.path_prefix, "/private");
        assert_eq!(private.storage_dir, Utf8Path::new("/var/lib/troc/private"));
        assert!(private.is_local());
    }

    #[test]
    fn test_defaults() {
        let raw = parse_troc_toml("[[registries]]\nstorage_dir = \"data\"\n").unwrap();
        assert_eq!(raw.server.listen, "127.0.0.1:4873");
        assert_eq!(raw.server.upstream_timeout_secs, 30);
        assert_eq!(raw.server.secret, None);
    }

    #[test]
    fn test_missing_secret() {
        let raw = parse_troc_toml("[[registries]]\nstorage_dir = \"data\"\n").unwrap();
        let err = validate_config(&raw, Utf8Path::new(".")).unwrap_err();
        assert!(matches!(err, TrocError::ConfigValidation { ref field, .. } if field == "server.secret"));
    }

    #[test]
    fn test_invalid_syntax() {
        assert!(matches!(parse_troc_toml("[server"), Err(TrocError::TomlParse(_))));
    }

    #[test]
    fn test_duplicate_prefix() {
        let raw = parse_troc_toml(
            r#"
[server]
secret = "x"
[[registries]]
path_prefix = "/a"
storage_dir = "one"
[[registries]]
path_prefix = "a/"
storage_dir = "two"
"#,
        )
        .unwrap();
        let err = validate_config(&raw, Utf8Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("duplicate prefix"));
    }

    #[test]
    fn test_invalid_proxy() {
        let raw = parse_troc_toml(
            r#"
[server]
secret = "x"
[[registries]]
storage_dir = "one"
[[registries.proxies]]
url = "https://registry.npmjs.org"
include = ["/(unclosed"]
"#,
        )
        .unwrap();
        let err = validate_config(&raw, Utf8Path::new(".")).unwrap_err();
        assert!(matches!(err, TrocError::ConfigValidation { ref field, .. } if field == "registries[0].proxies[0].include"));

        let raw = parse_troc_toml(
            r#"
[server]
secret = "x"
[[registries]]
storage_dir = "one"
[[registries.proxies]]
url = "ftp://mirror.example"
include = ["/(.*)"]
"#,
        )
        .unwrap();
        assert!(validate_config(&raw, Utf8Path::new(".")).is_err());
    }

    #[test]
    fn test_round_trip_serialization() {
        let raw = parse_troc_toml(FULL).unwrap();
        let serialized = serialize_troc_toml(&raw).unwrap();
        let reparsed = parse_troc_toml(&serialized).unwrap();
        assert_eq!(raw, reparsed);
    }
}
