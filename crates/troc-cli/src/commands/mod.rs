//! Command implementations for the troc CLI

pub mod check;
pub mod serve;

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use troc_config::{ConfigLayering, ConfigLoader, ConfigSource, GatewayConfig};
use troc_core::error::{TrocError, TrocResult};

use crate::output::OutputHandler;
use crate::Commands;

/// Shared context for all commands
pub struct CommandContext {
    pub cwd: Utf8PathBuf,
    pub output: OutputHandler,
}

impl CommandContext {
    pub fn new() -> TrocResult<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| TrocError::io("Failed to read the working directory".to_string(), e))?;
        let cwd = Utf8PathBuf::try_from(cwd).map_err(|e| TrocError::ConfigValidation {
            field: "cwd".to_string(),
            reason: format!("working directory is not valid UTF-8: {}", e),
        })?;

        Ok(Self {
            cwd,
            output: OutputHandler::new(),
        })
    }

    /// Locate and validate the config, with `TROC_*` variables and the
    /// `--listen` flag layered on top of the file
    pub async fn load_config(
        &self,
        explicit: Option<&Utf8Path>,
        listen: Option<&str>,
    ) -> TrocResult<(GatewayConfig, ConfigSource)> {
        let mut cli_overrides = HashMap::new();
        if let Some(listen) = listen {
            cli_overrides.insert("listen".to_string(), listen.to_string());
        }

        let env_overrides = ConfigLayering::collect_env_overrides();
        let loaded = ConfigLoader::new(self.cwd.clone())
            .load(explicit, &env_overrides, &cli_overrides)
            .await?;
        debug!(config = %loaded.1.path(), "configuration loaded");
        Ok(loaded)
    }
}

/// Dispatch command to appropriate handler
pub async fn dispatch_command(command: Commands, ctx: &CommandContext) -> TrocResult<()> {
    match command {
        Commands::Serve { config, listen } => serve::execute(config.as_deref(), listen.as_deref(), ctx).await,
        Commands::Check { config } => check::execute(config.as_deref(), ctx).await.map(|_| ()),
    }
}
