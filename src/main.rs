//! Main entry point for Tamil Translate CLI

#![forbid(unsafe_code)]

use clap::Parser;
use dotenvy::dotenv;
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tamil_translate::cli::commands::{self, Commands};
use tamil_translate::core::config::PipelineConfig;
use tamil_translate::pipeline::CancellationToken;

/// Tamil Translate - resumable Sanskrit/Hindi PDF translation to English and Tamil
#[derive(Parser, Debug)]
#[command(name = "tamil-translate", version, about, long_about = None)]
struct Args {
    /// API key for Sarvam (optional, defaults to SARVAM_API_KEY env var)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Configuration file (JSON, TOML or YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}={}", env!("CARGO_CRATE_NAME"), log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = PipelineConfig::load(args.config.as_deref())?;
    if let Some(api_key) = args.api_key {
        config.api_key = api_key;
    }

    // Ctrl-C stops after the stage in flight
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received; finishing the current stage and saving progress");
                cancel.cancel();
            }
        });
    }

    // Execute command
    match args.command {
        Some(Commands::Translate(translate)) => {
            commands::handle_translate(translate, config, cancel).await?;
        }
        Some(Commands::Status { input }) => {
            commands::handle_status(input, config).await?;
        }
        Some(Commands::Clear { input }) => {
            commands::handle_clear(input, config).await?;
        }
        None => {
            println!("Please specify a command. Use --help for more information.");
        }
    }

    Ok(())
}
