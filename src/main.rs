use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use docchat::config::Settings;
use docchat::server::{self, AppState};
use docchat::snapshot::Snapshot;
use docchat::vector_entry::IndexEntry;

#[derive(Parser)]
#[command(name = "docchat")]
#[command(version = "0.1")]
#[command(about = "Chat with your documents using local embeddings and a local LLM", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve,
    /// Ingest files into the snapshot directory
    Add {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List ingested documents
    List,
    /// Print the chunks closest to a query
    Search {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Answer a single question from the ingested documents
    Ask { question: String },
    /// Print the resolved configuration
    Config,
}

fn init_tracing() {
    let verbose = env::var("DOCCHAT_VERBOSE")
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false);
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_state(settings: Settings) -> Result<AppState> {
    AppState::from_settings(settings).context("failed to initialise docchat")
}

fn require_snapshot(settings: &Settings, command: &str) -> Result<()> {
    if settings.snapshot_dir.is_none() {
        anyhow::bail!("`docchat {command}` needs DOCCHAT_SNAPSHOT_DIR to be set");
    }
    Ok(())
}

fn add_command(settings: Settings, files: &[PathBuf]) -> Result<()> {
    require_snapshot(&settings, "add")?;
    let state = load_state(settings)?;

    for path in files {
        let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let report = state
            .pipeline
            .ingest_bytes(&file_name, None, bytes)
            .with_context(|| format!("failed to ingest {}", path.display()))?;
        println!("{}", serde_json::to_string(&report)?);
    }
    Ok(())
}

fn list_command(settings: Settings) -> Result<()> {
    let dir = settings
        .snapshot_dir
        .as_deref()
        .context("`docchat list` needs DOCCHAT_SNAPSHOT_DIR to be set")?;
    let entries = Snapshot::open(dir)
        .and_then(|snapshot| snapshot.load())
        .with_context(|| format!("failed to read snapshot at {dir}"))?;

    for (id, file_name, chunks) in documents(&entries) {
        println!("{}\t{}\t{} chunks", id, file_name, chunks);
    }
    Ok(())
}

/// Per-document chunk counts, in first-ingested order.
fn documents(entries: &[IndexEntry]) -> Vec<(Uuid, String, usize)> {
    let mut order: Vec<(Uuid, String, usize)> = Vec::new();
    let mut slots: HashMap<Uuid, usize> = HashMap::new();
    for entry in entries {
        let slot = *slots.entry(entry.chunk.document_id).or_insert_with(|| {
            order.push((entry.chunk.document_id, entry.chunk.file_name.clone(), 0));
            order.len() - 1
        });
        order[slot].2 += 1;
    }
    order
}

async fn search_command(settings: Settings, query: &str, top_k: Option<usize>) -> Result<()> {
    let k = top_k.unwrap_or(settings.top_k).max(1);
    let state = load_state(settings)?;
    let results = state.orchestrator.retrieve(query, k).await?;
    let record_count = state
        .index
        .read()
        .map_err(|_| anyhow::anyhow!("index lock poisoned"))?
        .len();

    let output = serde_json::json!({
        "query": query,
        "index_entry_count": record_count,
        "results": results.iter().map(|result| {
            serde_json::json!({
                "chunk_id": result.chunk.id,
                "file_name": result.chunk.file_name,
                "similarity": result.score,
                "preview": result.chunk.preview(120),
            })
        }).collect::<Vec<_>>(),
        "actual_results_count": results.len(),
        "requested_results_count": k,
    });
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

async fn ask_command(settings: Settings, question: &str) -> Result<()> {
    let state = load_state(settings)?;
    let answer = state.orchestrator.ask(question, None).await?;
    println!("{}", answer.answer);
    for source in &answer.sources {
        println!("  [{:.3}] {} ({})", source.score, source.file_name, source.chunk_id);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Cli::parse();
    let settings = Settings::new()?;

    match args.command {
        Commands::Serve => server::serve(settings).await?,
        Commands::Add { files } => add_command(settings, &files)?,
        Commands::List => list_command(settings)?,
        Commands::Search { query, top_k } => search_command(settings, &query, top_k).await?,
        Commands::Ask { question } => ask_command(settings, &question).await?,
        Commands::Config => settings.print_config(),
    }
    Ok(())
}
