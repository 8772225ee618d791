use anyhow::Result;
use clap::{Parser, Subcommand};
use hris_adapters::Window;
use hris_core::IngestKind;
use hris_ingest::{connect_from_config, IngestConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "hris_cli=info,hris_ingest=info,hris_storage=info,hris_web=info";

#[derive(Debug, Parser)]
#[command(name = "hris-cli")]
#[command(about = "HRIS batch ingestion command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Ingest one CSV file from `DATA_DIR` and print the batch result as JSON.
    Ingest {
        /// departments, jobs or hired
        kind: IngestKind,
        /// File name inside the managed data directory.
        file: String,
        #[arg(long)]
        offset: Option<i64>,
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Start the HTTP API.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = IngestConfig::from_env();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Ingest {
            kind,
            file,
            offset,
            limit,
        } => {
            let window = Window::page(offset, limit)?;
            let ingestor = connect_from_config(&config).await?;
            info!(engine = ingestor.store().engine(), kind = kind.as_str(), file = %file, "ingesting file");
            let result = ingestor.ingest_file(kind, &file, Some(window)).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Serve => hris_web::serve(config).await?,
    }

    Ok(())
}
