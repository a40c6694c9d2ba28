use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::CliConfig;

#[derive(Parser, Debug)]
#[command(name = "fanout")]
#[command(about = "Fanout CLI - distributed search over in-process clusters")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "fanout.toml", env = "FANOUT_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load a JSON data set and run a search request against it
    Search {
        /// Data set describing clusters, indices and documents
        #[arg(short, long)]
        data: PathBuf,

        /// Search request JSON, or - for stdin
        #[arg(short, long, default_value = "-")]
        request: PathBuf,

        /// Pin readers with a point in time before searching
        #[arg(long)]
        point_in_time: bool,

        /// Pretty-print the response
        #[arg(long)]
        pretty: bool,
    },

    /// Write a default configuration file
    InitConfig {
        /// Output path
        #[arg(short, long, default_value = "fanout.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate the configuration and optionally a search request
    Validate {
        /// Search request JSON to check
        #[arg(short, long)]
        request: Option<PathBuf>,
    },
}

fn init_tracing(config: &CliConfig) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| config.core.logging.level.clone()),
    );
    let registry = tracing_subscriber::registry().with(filter);
    if config.core.logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = CliConfig::load_or_default(&cli.config)?;
    init_tracing(&config);
    tracing::debug!("Config file: {}", cli.config.display());

    match cli.command {
        Commands::Search {
            data,
            request,
            point_in_time,
            pretty,
        } => {
            config.validate()?;
            commands::run_search(&config, &data, &request, point_in_time, pretty).await?;
        }
        Commands::InitConfig { output, force } => {
            commands::run_init_config(&output, force)?;
        }
        Commands::Validate { request } => {
            commands::run_validate(&config, request.as_deref())?;
        }
    }

    Ok(())
}
