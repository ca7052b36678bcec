use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use pdf_qa_core::{IngestionOutcome, PipelineConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

mod error;
mod logging;
mod routes;
mod state;

use state::Pipeline;

#[derive(Parser)]
#[command(name = "pdf-qa", version, about = "Ask questions over a folder of PDFs")]
struct Cli {
    /// Path to the JSON config file.
    #[arg(long, env = "PDF_QA_CONFIG", default_value = "config/config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest the configured PDF folder in the background and serve HTTP.
    Serve,
    /// Ingest the configured PDF folder once and exit.
    Ingest,
    /// Answer one question from the existing index.
    Ask {
        #[arg(long)]
        question: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = PipelineConfig::load(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;
    let logging = config
        .as_ref()
        .map(|config| config.logging.clone())
        .unwrap_or_default();
    logging::init(&logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config_version = config.as_ref().and_then(|config| config.version.as_deref()),
        environment = config.as_ref().and_then(|config| config.environment.as_deref()),
        started_at = %Utc::now().to_rfc3339(),
        "pdf-qa boot"
    );

    let command = cli.command.unwrap_or(Command::Serve);
    let Some(config) = config else {
        return missing_config(&cli.config, matches!(command, Command::Ingest));
    };

    match command {
        Command::Serve => serve(config).await,
        Command::Ingest => ingest(config).await,
        Command::Ask { question } => ask(config, &question).await,
    }
}

/// Ingesting without a config is a no-op; the other commands need one.
fn missing_config(path: &Path, ingesting: bool) -> anyhow::Result<()> {
    if ingesting {
        warn!(path = %path.display(), "no config file; nothing to ingest");
        println!("0 records indexed (no config file at {})", path.display());
        return Ok(());
    }
    anyhow::bail!("config file {} not found", path.display())
}

async fn serve(config: PipelineConfig) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(&config).await?;
    let app = routes::build_router(Arc::new(pipeline.app_state()));

    let orchestrator = Arc::clone(&pipeline.orchestrator);
    let ingest_config = config.clone();
    tokio::spawn(async move {
        if let Err(error) = orchestrator.run(&ingest_config).await {
            error!(error = %error, "background ingestion failed; /ask will stay unavailable");
        }
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn ingest(config: PipelineConfig) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(&config).await?;

    match pipeline.orchestrator.run(&config).await? {
        IngestionOutcome::Ingested(summary) => {
            for skipped in &summary.skipped_files {
                warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
            }
            println!(
                "{} documents, {} chunks ({} new, {} updated); index holds {} records",
                summary.documents,
                summary.chunks,
                summary.inserted,
                summary.replaced,
                summary.records
            );
            if let Some(path) = summary.chunks_file {
                println!("chunks written to {}", path.display());
            }
        }
        IngestionOutcome::AlreadyRun(state) => {
            println!("ingestion already {}", state.label());
        }
    }
    Ok(())
}

async fn ask(config: PipelineConfig, question: &str) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(&config).await?;
    info!(k = pipeline.synthesizer.retriever().k(), "querying existing index");

    let result = pipeline.synthesizer.ask(question).await?;
    println!("{}", result.answer);
    if !result.sources.is_empty() {
        println!();
        println!("sources:");
        for source in &result.sources {
            println!("  - {source}");
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(error = %error, "failed to listen for shutdown signal");
    }
    info!("shutting down");
}
