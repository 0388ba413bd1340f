//! Config file discovery, environment overrides and CLI overrides

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};
use troc_core::error::TrocError;

use crate::toml::{load_from_file, validate_config, GatewayConfig, TrocToml};
use crate::ConfigResult;

/// Default config file name looked up from the working directory
pub const CONFIG_FILE_NAME: &str = "troc.toml";

/// Main configuration loading interface
pub struct ConfigLoader {
    /// Current working directory
    cwd: Utf8PathBuf,
}

/// Configuration source tracking
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Path given with `--config`
    Explicit(Utf8PathBuf),
    /// troc.toml found in the working directory or a parent
    Project(Utf8PathBuf),
    /// ~/.troc/troc.toml
    Global(Utf8PathBuf),
}

impl ConfigSource {
    pub fn path(&self) -> &Utf8Path {
        match self {
            ConfigSource::Explicit(path) | ConfigSource::Project(path) | ConfigSource::Global(path) => path,
        }
    }
}

/// Configuration layering: file, then `TROC_*` environment, then CLI flags
pub struct ConfigLayering;

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new(cwd: Utf8PathBuf) -> Self {
        Self { cwd }
    }

    /// Locate the config file: explicit path, then troc.toml walking up from
    /// the working directory, then the per-user global file
    pub fn locate(&self, explicit: Option<&Utf8Path>) -> ConfigResult<ConfigSource> {
        if let Some(path) = explicit {
            let path = self.cwd.join(path);
            if !path.exists() {
                return Err(TrocError::ConfigValidation {
                    field: "config".to_string(),
                    reason: format!("config file {} does not exist", path),
                });
            }
            return Ok(ConfigSource::Explicit(path));
        }

        let mut current = Some(self.cwd.as_path());
        while let Some(dir) = current {
            let candidate = dir.join(CONFIG_FILE_NAME);
            if candidate.exists() {
                return Ok(ConfigSource::Project(candidate));
            }
            current = dir.parent();
        }

        if let Some(global) = Self::global_config_path() {
            if global.exists() {
                return Ok(ConfigSource::Global(global));
            }
        }

        Err(TrocError::ConfigValidation {
            field: "config".to_string(),
            reason: format!(
                "No {} found in {} or its parents, and no ~/.troc/{}",
                CONFIG_FILE_NAME, self.cwd, CONFIG_FILE_NAME
            ),
        })
    }

    fn global_config_path() -> Option<Utf8PathBuf> {
        let home = dirs::home_dir()?;
        let home = Utf8PathBuf::try_from(home).ok()?;
        Some(home.join(".troc").join(CONFIG_FILE_NAME))
    }

    /// Load, layer and validate the gateway configuration
    pub async fn load(
        &self,
        explicit: Option<&Utf8Path>,
        env_overrides: &HashMap<String, String>,
        cli_overrides: &HashMap<String, String>,
    ) -> ConfigResult<(GatewayConfig, ConfigSource)> {
        let source = self.locate(explicit)?;
        let mut raw = load_from_file(source.path()).await?;

        ConfigLayering::apply_env_overrides(&mut raw, env_overrides)?;
        ConfigLayering::apply_cli_overrides(&mut raw, cli_overrides);

        // Storage directories are relative to the file that names them
        let base_dir = source.path().parent().unwrap_or(self.cwd.as_path());
        let config = validate_config(&raw, base_dir)?;
        Ok((config, source))
    }
}

impl ConfigLayering {
    /// Apply environment variable overrides
    pub fn apply_env_overrides(config: &mut TrocToml, overrides: &HashMap<String, String>) -> ConfigResult<()> {
        for (key, value) in overrides {
            match key.as_str() {
                "TROC_LISTEN" => {
                    config.server.listen = value.clone();
                }
                "TROC_SECRET" => {
                    config.server.secret = Some(value.clone());
                }
                "TROC_UPSTREAM_TIMEOUT_SECS" => {
                    config.server.upstream_timeout_secs =
                        value.parse().map_err(|e| TrocError::ConfigValidation {
                            field: "TROC_UPSTREAM_TIMEOUT_SECS".to_string(),
                            reason: format!("'{}' is not a number of seconds: {}", value, e),
                        })?;
                }
                "TROC_PUBLIC_SCHEME" => {
                    config.server.public_scheme = value.clone();
                }
                _ => {
                    // Unknown environment variable, ignore
                }
            }
        }

        Ok(())
    }

    /// Apply CLI flag overrides
    pub fn apply_cli_overrides(config: &mut TrocToml, overrides: &HashMap<String, String>) {
        if let Some(listen) = overrides.get("listen") {
            config.server.listen = listen.clone();
        }
    }

    /// Collect environment variable overrides
    pub fn collect_env_overrides() -> HashMap<String, String> {
        std::env::vars().filter(|(key, _)| key.starts_with("TROC_")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
[server]
secret = "file-secret"

[[registries]]
storage_dir = "storage"
"#;

    fn temp_path(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap()
    }

    #[tokio::test]
    async fn test_locate_walks_up() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_path(&temp_dir);
        tokio::fs::write(root.join(CONFIG_FILE_NAME), MINIMAL).await.unwrap();
        let nested = root.join("a").join("b");
        tokio::fs::create_dir_all(&nested).await.unwrap();

        let loader = ConfigLoader::new(nested);
        let source = loader.locate(None).unwrap();
        assert_eq!(source, ConfigSource::Project(root.join(CONFIG_FILE_NAME)));
    }

    #[tokio::test]
    async fn test_explicit_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let loader = ConfigLoader::new(temp_path(&temp_dir));
        assert!(loader.locate(Some(Utf8Path::new("missing.toml"))).is_err());
    }

    #[tokio::test]
    async fn test_load_with_overrides() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_path(&temp_dir);
        tokio::fs::write(root.join("gateway.toml"), MINIMAL).await.unwrap();

        let env = HashMap::from([
            ("TROC_SECRET".to_string(), "env-secret".to_string()),
            ("TROC_LISTEN".to_string(), "127.0.0.1:9000".to_string()),
        ]);
        let cli = HashMap::from([("listen".to_string(), "127.0.0.1:9100".to_string())]);

        let loader = ConfigLoader::new(root.clone());
        let (config, source) = loader
            .load(Some(Utf8Path::new("gateway.toml")), &env, &cli)
            .await
            .unwrap();

        assert!(matches!(source, ConfigSource::Explicit(_)));
        assert_eq!(config.server.secret, "env-secret");
        // CLI wins over environment
        assert_eq!(config.server.listen.port(), 9100);
        assert_eq!(config.registries[0].storage_dir, root.join("storage"));
    }

    #[test]
    fn test_invalid_timeout_override() {
        let mut raw = TrocToml::default();
        let env = HashMap::from([("TROC_UPSTREAM_TIMEOUT_SECS".to_string(), "soon".to_string())]);
        assert!(ConfigLayering::apply_env_overrides(&mut raw, &env).is_err());
    }
}
