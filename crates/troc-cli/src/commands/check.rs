//! `troc check`: validate the configuration without starting the server

use camino::Utf8Path;

use troc_config::GatewayConfig;
use troc_core::error::TrocResult;
use troc_core::RegistryType;

use super::CommandContext;

pub async fn execute(config: Option<&Utf8Path>, ctx: &CommandContext) -> TrocResult<GatewayConfig> {
    let (config, source) = ctx.load_config(config, None).await?;
    let out = &ctx.output;

    out.success(&format!("{} is valid", source.path()));
    out.field("listen", &config.server.listen.to_string());
    out.field("timeout", &format!("{}s", config.server.upstream_timeout.as_secs()));

    for registry in &config.registries {
        let prefix = if registry.path_prefix.is_empty() {
            "/"
        } else {
            registry.path_prefix.as_str()
        };
        let kind = match registry.registry_type() {
            RegistryType::Local => "local",
            RegistryType::Proxy => "proxy",
        };

        out.heading(&format!("registry {} ({})", prefix, kind));
        out.field("storage", registry.storage_dir().as_str());
        for proxy in &registry.proxies {
            out.field("upstream", &proxy.url);
            if proxy.include.is_empty() {
                out.warn(&format!("{} has no include patterns and will never be used", proxy.url));
            }
        }
    }

    Ok(config)
}
