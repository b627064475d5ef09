//! CDP Ingest - consortium disclosure ingestion tool

use anyhow::{Context, Result};
use cdp_common::logging::{init_logging, LogConfig, LogLevel};
use cdp_ingest::catalog::{SchemaCatalog, DEFAULT_DATASET};
use cdp_ingest::classify::{classify_headers, classify_name};
use cdp_ingest::controller::IngestionController;
use cdp_ingest::loader::DEFAULT_BATCH_SIZE;
use cdp_ingest::memory::{MemoryAnalyticalStore, MemoryControlStore, MemoryObjectStore};
use cdp_ingest::normalize::file_name;
use cdp_ingest::rows::read_table;
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "cdp-ingest")]
#[command(author, version, about = "Consortium disclosure ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show how a file would be classified
    Classify {
        /// File to inspect
        path: PathBuf,
    },

    /// Run the full pipeline against in-memory stores and print the report
    Preview {
        /// File to ingest
        path: PathBuf,

        #[command(flatten)]
        options: PipelineOptions,
    },

    /// Ingest a file into Postgres
    #[cfg(feature = "database")]
    Load {
        /// File to ingest
        path: PathBuf,

        #[command(flatten)]
        options: PipelineOptions,
    },
}

#[derive(Args, Debug)]
struct PipelineOptions {
    /// Destination dataset
    #[arg(long, env = "INGEST_DATASET", default_value = DEFAULT_DATASET)]
    dataset: String,

    /// Rows per insert batch
    #[arg(long, env = "INGEST_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// JSON schema catalog replacing the built-in one
    #[arg(long)]
    catalog: Option<PathBuf>,
}

impl PipelineOptions {
    fn catalog(&self) -> Result<SchemaCatalog> {
        match &self.catalog {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read catalog {}", path.display()))?;
                SchemaCatalog::from_json(&text)
                    .with_context(|| format!("Invalid catalog {}", path.display()))
            }
            None => Ok(SchemaCatalog::standard(self.dataset.clone())),
        }
    }
}

fn read_input(path: &Path) -> Result<(Vec<u8>, String)> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = file_name(&path.to_string_lossy()).to_string();
    Ok((bytes, name))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flag
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("cdp-ingest")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    match cli.command {
        Command::Classify { path } => {
            let (bytes, name) = read_input(&path)?;
            let by_name = classify_name(&name);
            let table = read_table(&bytes, &name)?;
            let by_headers = classify_headers(table.headers.as_slice());
            let classification = if by_name.is_known() { by_name } else { by_headers };
            let output = json!({
                "file": name,
                "by_name": by_name,
                "by_headers": by_headers,
                "classification": classification,
                "headers": table.headers,
                "rows": table.rows.len(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Preview { path, options } => {
            let (bytes, name) = read_input(&path)?;
            let catalog = Arc::new(options.catalog()?);
            let dataset = catalog.dataset.clone();
            let analytical = Arc::new(MemoryAnalyticalStore::new());
            let controller = IngestionController::new(
                Arc::new(MemoryControlStore::new()),
                analytical.clone(),
                Arc::new(MemoryObjectStore::new()),
                catalog,
            )
            .with_batch_size(options.batch_size);

            let storage_path = controller.raw_path(&name);
            controller.register_upload(&name, &storage_path).await?;
            let report = controller.ingest(&bytes, &name, &storage_path).await?;

            let output = json!({
                "report": report,
                "tables": analytical.counts(&dataset).await,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        #[cfg(feature = "database")]
        Command::Load { path, options } => {
            use cdp_ingest::postgres::{self, DbConfig, PgAnalyticalStore, PgControlStore};

            let (bytes, name) = read_input(&path)?;
            let catalog = Arc::new(options.catalog()?);
            let pool = postgres::create_pool(&DbConfig::from_env()?).await?;
            postgres::migrate(&pool).await?;

            let controller = IngestionController::new(
                Arc::new(PgControlStore::new(pool.clone())),
                Arc::new(PgAnalyticalStore::new(pool, catalog.clone())),
                Arc::new(MemoryObjectStore::new()),
                catalog,
            )
            .with_batch_size(options.batch_size);

            let storage_path = controller.raw_path(&name);
            controller.register_upload(&name, &storage_path).await?;
            let report = controller.ingest(&bytes, &name, &storage_path).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    info!("Done");
    Ok(())
}
