//! Process-wide state shared by every request

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info};

use troc_cache::{PackageStore, RegistryCache};
use troc_config::{GatewayConfig, ServerSettings};
use troc_core::error::TrocError;
use troc_core::Registry;
use troc_registry::{ClientConfig, UpstreamClient};

use crate::ServerResult;

/// One configured registry with its stores
#[derive(Debug)]
pub struct RegistryState {
    pub registry: Registry,
    pub cache: RegistryCache,
    pub packages: PackageStore,
    /// Serialises read-modify-write of package documents
    pub publish_lock: Mutex<()>,
}

impl RegistryState {
    pub fn new(registry: Registry) -> Self {
        let cache = RegistryCache::new(registry.storage_dir());
        let packages = PackageStore::new(registry.storage_dir());
        Self {
            registry,
            cache,
            packages,
            publish_lock: Mutex::new(()),
        }
    }
}

/// Configuration, stores and the upstream client, built once at startup
#[derive(Debug)]
pub struct AppContext {
    pub settings: ServerSettings,
    pub registries: Vec<RegistryState>,
    pub upstream: UpstreamClient,
}

impl AppContext {
    pub fn new(config: GatewayConfig) -> ServerResult<Arc<Self>> {
        let upstream = UpstreamClient::with_config(ClientConfig {
            attempt_timeout: config.server.upstream_timeout,
            ..ClientConfig::default()
        })?;

        Ok(Arc::new(Self {
            settings: config.server,
            registries: config.registries.into_iter().map(RegistryState::new).collect(),
            upstream,
        }))
    }

    /// Registry with the longest prefix owning `registry_path`
    pub fn registry_for(&self, registry_path: &str) -> Option<&RegistryState> {
        self.registries
            .iter()
            .filter(|state| state.registry.owns(registry_path))
            .max_by_key(|state| state.registry.path_prefix.len())
    }

    /// Load the auth logs of every registry. A registry whose logs cannot
    /// be read keeps answering 503; the others load regardless.
    pub async fn load_caches(&self) -> ServerResult<()> {
        let mut first_error = None;

        for state in &self.registries {
            let dir = state.registry.storage_dir();
            let loaded = async {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|e| TrocError::io(format!("Failed to create {}", dir), e))?;
                state.cache.read_all().await
            }
            .await;

            match loaded {
                Ok(()) => info!(prefix = %display_prefix(&state.registry), storage = %dir, "registry ready"),
                Err(e) => {
                    error!(prefix = %display_prefix(&state.registry), error = %e, "failed to load registry cache");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Origin plus registry prefix that clients should fetch tarballs from
    pub fn public_base_url(&self, host: Option<&str>, registry: &Registry) -> String {
        let host = match host {
            Some(host) => host.to_string(),
            None => self.settings.listen.to_string(),
        };
        format!("{}://{}{}", self.settings.public_scheme, host, registry.path_prefix)
    }
}

/// Root prefix is shown as `/`
pub fn display_prefix(registry: &Registry) -> &str {
    if registry.path_prefix.is_empty() {
        "/"
    } else {
        &registry.path_prefix
    }
}
