use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use txn2pg::config::RuntimeConfig;

/// Consume transaction events from Kafka and persist them to PostgreSQL
#[derive(Parser)]
#[command(name = "txn2pg")]
#[command(version)]
#[command(about = "Consume transaction events from Kafka and persist them to PostgreSQL", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the ingestion pipeline (default)
    #[cfg_attr(
        not(feature = "kafka"),
        command(
            about = "Run the ingestion pipeline (default; unavailable in this build)",
            long_about = "Run the ingestion pipeline.\n\n\
                This binary was built without Kafka support, so serve exits with an error. \
                Rebuild with `--features kafka` to consume from Kafka."
        )
    )]
    Serve,
    /// Load and validate configuration, then print it with secrets masked
    CheckConfig,
    /// Print a stored transaction as JSON
    Lookup {
        /// Transaction id to look up
        transaction_id: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Build tokio runtime and run async entry point
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let mut config = if let Some(config_path) = &cli.config {
        RuntimeConfig::load_from_path(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        RuntimeConfig::load().context("Failed to load configuration")?
    };

    // CLI flag beats file and environment
    if let Some(level) = &cli.log_level {
        config.app.log_level = level.clone();
        config.validate()?;
    }

    txn2pg::init::init_tracing(&config.app);
    for warning in config.warnings() {
        tracing::warn!("{}", warning);
    }

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => txn2pg::run_with_config(config).await,
        Command::CheckConfig => {
            let rendered = toml::to_string_pretty(&config.redacted())
                .context("Failed to render configuration")?;
            println!("{}", rendered);
            Ok(())
        }
        Command::Lookup { transaction_id } => {
            match txn2pg::lookup(&config, &transaction_id).await? {
                Some(record) => {
                    let json = serde_json::to_string_pretty(&record)
                        .context("Failed to encode transaction")?;
                    println!("{}", json);
                    Ok(())
                }
                None => anyhow::bail!("transaction {} not found", transaction_id),
            }
        }
    }
}
