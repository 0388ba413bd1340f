//! # troc-cli
//!
//! npm registry gateway: serves locally published packages and proxies the
//! rest from upstream registries.
//!
//! This is the entry point for the `troc` binary. It parses arguments, sets
//! up logging and dispatches to the command handlers.

use std::process::ExitCode;

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use troc_core::error::TrocError;

mod commands;
mod output;

use commands::CommandContext;
use output::errors::ErrorFormatter;

/// npm registry gateway
#[derive(Parser)]
#[command(name = "troc", version, about = "npm registry gateway")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log as JSON lines
    #[arg(long, global = true, env = "TROC_LOG_JSON")]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the gateway
    Serve {
        /// Config file; defaults to troc.toml in this or a parent directory
        #[arg(short, long, value_name = "FILE")]
        config: Option<Utf8PathBuf>,
        /// Listen address, overrides the config file and TROC_LISTEN
        #[arg(long, value_name = "ADDR")]
        listen: Option<String>,
    },
    /// Validate the configuration and print the registries it defines
    Check {
        #[arg(short, long, value_name = "FILE")]
        config: Option<Utf8PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.log_json);
    setup_panic_handler();

    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli(cli: Cli) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;

    rt.block_on(async {
        let ctx = CommandContext::new()?;
        commands::dispatch_command(cli.command, &ctx).await?;
        Ok::<(), anyhow::Error>(())
    })
}

fn report(error: &anyhow::Error) {
    let formatter = ErrorFormatter::new();
    match error.downcast_ref::<TrocError>() {
        Some(e) => eprint!("{}", formatter.format_error(e)),
        None => eprintln!("{}", formatter.format_simple(&format!("{:#}", error))),
    }
}

fn setup_logging(verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "troc={level},troc_server={level},troc_registry={level},troc_cache={level},troc_config={level}"
        ))
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        error!("troc encountered an unexpected error: {}", panic_info);
        eprintln!("troc crashed! This is a bug.");
        eprintln!("Error: {}", panic_info);
    }));
}
