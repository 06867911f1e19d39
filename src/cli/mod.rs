//! Command-line interface definitions and dispatch.

mod cache;
mod generate;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use studiocache::config::Config;
use studiocache::logging::{self, LogFormat};

/// Inspect and maintain the studiocache response cache.
#[derive(Debug, Parser)]
#[command(name = "studiocache", version, about)]
pub(crate) struct Cli {
    /// Log output format (filter with RUST_LOG).
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Print the digest and durable-store id for a cache key.
    Digest {
        /// Cache key exactly as the caller builds it.
        key: String,
    },
    /// Print the cached value for a key, if any.
    Get {
        key: String,
    },
    /// Remove every cached entry in the configured namespace.
    Purge,
    /// Summarise the durable store.
    Stats,
    /// Run a memoized text generation against Gemini.
    Generate {
        /// Model to call (defaults to the configured model).
        #[arg(long)]
        model: Option<String>,
        /// Bypass the cache lookup and store.
        #[arg(long)]
        no_cache: bool,
        /// Prompt text.
        prompt: String,
    },
}

/// Parse arguments, set up logging and config, and dispatch.
pub(crate) async fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_format);

    let config = Config::load().with_context(|| "Failed to load configuration")?;

    match cli.command {
        Commands::Digest { key } => cache::cmd_digest(&config, &key),
        Commands::Get { key } => cache::cmd_get(&config, &key).await,
        Commands::Purge => cache::cmd_purge(&config).await,
        Commands::Stats => cache::cmd_stats(&config).await,
        Commands::Generate {
            model,
            no_cache,
            prompt,
        } => generate::cmd_generate(&config, model.as_deref(), no_cache, &prompt).await,
    }
}
