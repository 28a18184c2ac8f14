//! pdf-rag command line
//!
//! Run with: cargo run -p pdf-rag -- ask manual "What is this document about?"

use clap::{Parser, Subcommand};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pdf_rag::{ErrorKind, RagConfig, RagService};

#[derive(Parser)]
#[command(name = "pdf-rag", version, about = "Ask questions about PDF documents")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Pull the configured models before use (Ollama)
    #[arg(long, global = true)]
    pull: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract, chunk, and embed a PDF into its own store
    Ingest {
        /// PDF to ingest
        pdf: PathBuf,
        /// Document name (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,
        /// Chunk size in characters
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Overlap between consecutive chunks as a fraction of the chunk size
        #[arg(long)]
        overlap_ratio: Option<f32>,
    },
    /// Stream an answer to a question about a document
    Ask { name: String, question: String },
    /// Show the chunks retrieved for a question
    Retrieve { name: String, question: String },
    /// Delete a document's store
    Delete { name: String },
    /// List ingested documents
    List,
    /// Check that the model providers are reachable
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdf_rag=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => RagConfig::from_file(path)?,
        None => RagConfig::default(),
    };
    if cli.pull {
        config.llm.pull_models = true;
    }

    let service = RagService::from_config(config)?;

    match cli.command {
        Command::Ingest {
            pdf,
            name,
            chunk_size,
            overlap_ratio,
        } => {
            let name = match name {
                Some(name) => name,
                None => pdf
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| anyhow::anyhow!("{} has no file name", pdf.display()))?,
            };
            let chunk_size = chunk_size.unwrap_or(service.config().chunking.chunk_size);
            let overlap_ratio = overlap_ratio.unwrap_or(service.config().chunking.overlap_ratio);

            let spinner = ProgressBar::new_spinner();
            spinner.set_style(ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")?);
            spinner.set_message(format!("Ingesting {}", pdf.display()));
            spinner.enable_steady_tick(Duration::from_millis(120));

            let result = service
                .ingest_with_overlap(&pdf, &name, chunk_size, overlap_ratio)
                .await;
            spinner.finish_and_clear();
            let document = result?;

            println!(
                "Ingested {} ({} pages, {} chunks, model {}) into {}",
                document.name,
                document.total_pages.unwrap_or(0),
                document.total_chunks,
                document.embedding_model,
                document.persist_path.display()
            );
        }
        Command::Ask { name, question } => {
            let location = service.location_for(&name)?;
            let mut stream = service.answer(&question, &location).await?;

            let mut stdout = std::io::stdout();
            while let Some(fragment) = stream.next().await {
                stdout.write_all(fragment?.as_bytes())?;
                stdout.flush()?;
            }
            writeln!(stdout)?;
        }
        Command::Retrieve { name, question } => {
            let location = service.location_for(&name)?;
            let results = service.retrieve(&question, &location).await?;

            for (rank, result) in results.iter().enumerate() {
                println!(
                    "#{} chunk {} (similarity {:.3})\n{}\n",
                    rank + 1,
                    result.chunk.position,
                    result.similarity,
                    result.chunk.content
                );
            }
        }
        Command::Delete { name } => {
            let location = service.location_for(&name)?;
            if service.delete_store(&location).await? {
                println!("Deleted {}", location.display());
            } else {
                println!("Nothing to delete at {}", location.display());
            }
        }
        Command::List => {
            let documents = service.list_documents().await?;
            if documents.is_empty() {
                println!("No documents ingested under {}", service.config().storage.root.display());
            }
            for document in documents {
                println!(
                    "{}\t{} chunks\t{}\t{}",
                    document.name,
                    document.total_chunks,
                    document.embedding_model,
                    document.ingested_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        Command::Check => {
            let health = service.health_check().await;
            println!("embeddings: {} - {}", health.embedder, status(health.embedder_ok));
            println!("generation: {} - {}", health.generator, status(health.generator_ok));
            if !(health.embedder_ok && health.generator_ok) {
                anyhow::bail!("provider unavailable");
            }
        }
    }

    Ok(())
}

fn status(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "unreachable"
    }
}

fn exit_code(err: &anyhow::Error) -> u8 {
    let Some(err) = err.downcast_ref::<pdf_rag::Error>() else {
        return 1;
    };

    match err.kind() {
        ErrorKind::InvalidInput | ErrorKind::InvalidQuestion => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::ExtractionError => 4,
        ErrorKind::EmbeddingUnavailable | ErrorKind::GenerationUnavailable => 5,
        ErrorKind::Conflict => 6,
        ErrorKind::ChainNotInitialized | ErrorKind::HandleClosed | ErrorKind::Internal => 1,
    }
}
