//! `troc serve`

use camino::Utf8Path;

use troc_core::error::TrocResult;

use super::CommandContext;

pub async fn execute(config: Option<&Utf8Path>, listen: Option<&str>, ctx: &CommandContext) -> TrocResult<()> {
    let (config, source) = ctx.load_config(config, listen).await?;
    ctx.output.info(&format!("Using {}", source.path()));
    troc_server::run(config).await
}
