use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{debug, warn};

mod api;
mod error;
mod session;
mod wizard;

use crate::api::ApiClient;
use crate::error::{ClientError, ClientResult, format_error_chain};
use crate::session::ClientSession;
use crate::wizard::{Stage, allowed_stages, check, next_stage};

#[derive(Parser)]
#[command(name = "chatz")]
#[command(version, about = "Upload a PDF, then extract, embed and query it step by step", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Service base URL
    #[arg(long, global = true, default_value = "http://127.0.0.1:8000")]
    server: String,

    /// Where the current document is remembered between runs
    #[arg(long, global = true, default_value = ".chatz-session.json")]
    session: PathBuf,

    /// Skip client-side stage checks and let the server decide
    #[arg(long, global = true)]
    force: bool,

    /// Request timeout in seconds
    #[arg(long, global = true, default_value_t = 300)]
    timeout_secs: u64,

    /// Detailed logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a PDF and make it the current document
    Upload {
        path: PathBuf,
        /// Register the document under this name instead of the file name
        #[arg(long)]
        name: Option<String>,
    },
    /// Extract text from the current document
    Extract,
    /// Create embeddings for the current document
    Embed,
    /// Mark the current document ready for questions
    Ready,
    /// Ask a question about the current document
    Query { question: String },
    /// Show the current document and refresh its status from the server
    Status,
    /// Forget the current document
    Reset,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", format_error_chain(&e));
            if let ClientError::Gated { .. } = e {
                eprintln!("Use --force to send the request anyway.");
            }
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let default = if verbose { "chatz=debug" } else { "chatz=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> ClientResult<()> {
    let mut session = ClientSession::load(&cli.session)?;
    let client = ApiClient::new(&cli.server, Duration::from_secs(cli.timeout_secs))?;
    debug!(server = %cli.server, session = %cli.session.display(), "Client ready");

    let stage = match &cli.command {
        Commands::Upload { .. } => Some(Stage::Upload),
        Commands::Extract => Some(Stage::Extract),
        Commands::Embed => Some(Stage::Embed),
        Commands::Ready => Some(Stage::Ready),
        Commands::Query { .. } => Some(Stage::Query),
        Commands::Status | Commands::Reset => None,
    };
    if let Some(stage) = stage {
        if cli.force {
            if check(&session, stage).is_err() {
                warn!(stage = %stage, "Skipping stage check");
            }
        } else {
            check(&session, stage)?;
        }
    }

    let result = run_command(&cli.command, &client, &mut session).await;

    // The server is authoritative; resync after it rejects a stage
    if matches!(&result, Err(e) if e.is_conflict()) {
        refresh(&client, &mut session).await;
    }

    session.save(&cli.session)?;
    result
}

async fn run_command(
    command: &Commands,
    client: &ApiClient,
    session: &mut ClientSession,
) -> ClientResult<()> {
    match command {
        Commands::Upload { path, name } => {
            let bytes = std::fs::read(path).map_err(|e| ClientError::Io {
                path: path.clone(),
                source: e,
            })?;
            let file_name = match name {
                Some(name) => name.clone(),
                None => display_name(path),
            };

            let uploaded = client.upload(&file_name, bytes).await?;
            session.select(&uploaded.id, &uploaded.name, uploaded.status);

            if uploaded.deduplicated {
                println!(
                    "'{}' already exists ({}), continuing with it.",
                    uploaded.name, uploaded.status
                );
            } else {
                println!(
                    "Uploaded '{}': {} pages, {} bytes.",
                    uploaded.name, uploaded.page_count, uploaded.file_size
                );
            }
            println!("Document id: {}", uploaded.id);
        }
        Commands::Extract => {
            let id = current_id(session, Stage::Extract)?;
            let extracted = client.extract(&id).await?;
            session.set_status(extracted.status);

            println!(
                "Extracted {} chunks from {} pages of {}.",
                extracted.chunk_count, extracted.page_count, extracted.id
            );
            println!("--- preview ---\n{}", extracted.preview_text);
        }
        Commands::Embed => {
            let id = current_id(session, Stage::Embed)?;
            let embedded = client.embed(&id).await?;
            session.set_status(embedded.status);
            println!("Embeddings created for {}.", embedded.id);
        }
        Commands::Ready => {
            let id = current_id(session, Stage::Ready)?;
            let ready = client.ready(&id).await?;
            session.set_status(ready.status);
            println!("{} is {}. Ask away.", ready.id, ready.status);
        }
        Commands::Query { question } => {
            let id = current_id(session, Stage::Query)?;
            let answer = client.query(&id, question).await?;

            println!("{}", answer.answer);
            if !answer.sources.is_empty() {
                println!("\nSources:");
                for (i, source) in answer.sources.iter().enumerate() {
                    println!("[{}] {}", i + 1, source);
                }
            }
        }
        Commands::Status => {
            if session.document().is_some() {
                refresh(client, session).await;
            }
            print_status(session);
        }
        Commands::Reset => {
            session.clear();
            println!("Session cleared.");
        }
    }

    Ok(())
}

fn current_id(session: &ClientSession, stage: Stage) -> ClientResult<String> {
    session
        .document_id
        .clone()
        .ok_or_else(|| ClientError::Gated {
            stage,
            reason: "no document selected".to_string(),
        })
}

/// Pull the document's status from the server into the session
async fn refresh(client: &ApiClient, session: &mut ClientSession) {
    let Some(id) = session.document_id.clone() else {
        return;
    };

    match client.document(&id).await {
        Ok(document) => {
            debug!(
                doc_id = %document.id,
                pages = document.page_count,
                chunks = document.chunk_count,
                "Refreshed document"
            );
            session.select(&document.id, &document.file_name, document.status);
        }
        Err(e) => warn!(doc_id = %id, error = %format_error_chain(&e), "Could not refresh document status"),
    }
}

fn print_status(session: &ClientSession) {
    match session.document() {
        None => println!("No document selected."),
        Some((id, status)) => {
            let name = session.file_name.as_deref().unwrap_or("?");
            println!("Document: {} ({})", name, id);
            println!("Status:   {}", status);
            println!("Next:     {}", next_stage(status));
        }
    }

    let stages: Vec<String> = allowed_stages(session)
        .iter()
        .map(|s| s.to_string())
        .collect();
    println!("Available: {}", stages.join(", "));
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
