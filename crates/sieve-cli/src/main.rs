//! sieve - batch article classification from the command line.
//!
//! Results go to stdout as one JSON object per line; logs and the final
//! stats line go to stderr.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use sieve_core::{derive_key, normalize};
use sieve_runtime::providers::ConfigCredentialProvider;
use sieve_runtime::{
    ClassifierConfig, Orchestrator, ProviderRegistry, ValidationQueue, ANTHROPIC_API_KEY_ENV,
};

mod input;

#[derive(Parser)]
#[command(name = "sieve", version, about = "Classify news articles with caching and retries")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify one article per input line
    Classify {
        /// Input file (stdin when omitted or "-")
        input: Option<PathBuf>,

        /// YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Classification service to use
        #[arg(short, long, default_value = "anthropic")]
        provider: String,

        /// Service configuration as JSON (e.g. '{"base_url": "..."}')
        #[arg(long, default_value = "{}")]
        provider_config: String,

        /// Treat input lines as JSON objects with "id" and "text"
        #[arg(long)]
        jsonl: bool,
    },

    /// Print the canonical form and cache key of TEXT
    Normalize { text: String },

    /// Print the default configuration as YAML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Classify {
            input,
            config,
            provider,
            provider_config,
            jsonl,
        } => classify(input, config, &provider, &provider_config, jsonl).await,
        Command::Normalize { text } => {
            let canonical = normalize(&text);
            println!(
                "{}",
                serde_json::json!({
                    "normalized": canonical,
                    "key": derive_key(&canonical),
                })
            );
            Ok(())
        }
        Command::Config => {
            print!("{}", ClassifierConfig::default().to_yaml()?);
            Ok(())
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn classify(
    input: Option<PathBuf>,
    config_path: Option<PathBuf>,
    provider: &str,
    provider_config: &str,
    jsonl: bool,
) -> Result<()> {
    let config = match &config_path {
        Some(path) => ClassifierConfig::from_yaml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ClassifierConfig::default(),
    };

    let provider_config: serde_json::Value =
        serde_json::from_str(provider_config).context("--provider-config is not valid JSON")?;
    let service = ProviderRegistry::with_defaults().create(provider, &provider_config)?;
    let credentials = ConfigCredentialProvider::new(
        &provider_config,
        "api_key",
        ANTHROPIC_API_KEY_ENV,
        "Anthropic API key",
    );

    let raw = match input.as_deref() {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?,
        _ => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("reading stdin")?;
            buffer
        }
    };
    let items = input::parse_items(&raw, jsonl)?;

    let queue = Arc::new(ValidationQueue::new());
    let orchestrator = Orchestrator::builder()
        .service(service)
        .credentials(Arc::new(credentials))
        .config(config)
        .validation_sink(queue.clone())
        .build()?;

    let outcome = orchestrator.run_batch(items.clone()).await;
    for (index, (item, result)) in items.iter().zip(&outcome.results).enumerate() {
        println!("{}", input::render_outcome(index, item, result));
    }

    let stats = orchestrator.stats();
    tracing::info!(
        pending_validation = queue.pending(),
        hit_rate = stats.cache_hit_rate(),
        "Run finished"
    );
    eprintln!("{}", serde_json::to_string(&stats)?);

    if let Some(cause) = outcome.credential_failure {
        bail!("batch stopped early: {}", cause);
    }
    Ok(())
}
