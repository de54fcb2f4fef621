use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use bookshelf::config::{self, RunConfig};
use bookshelf::ingest;

/// Watch an inbox of PDF and EPUB files, infer metadata and a category
/// with a local LLM, and file each document into its category directory.
#[derive(Parser, Debug)]
#[command(name = "bookshelf", version, about)]
struct Cli {
    /// Inbox directory scanned for PDFs and EPUBs
    #[arg(long, value_name = "DIR")]
    input_dir: PathBuf,

    /// Output root for categorized PDFs
    #[arg(long, value_name = "DIR")]
    pdf_output_dir: PathBuf,

    /// Output root for categorized EPUBs
    #[arg(long, value_name = "DIR")]
    ebook_output_dir: PathBuf,

    /// Model used when no task-specific model is set
    #[arg(long, default_value = config::DEFAULT_MODEL)]
    default_model: String,

    /// Override model for metadata inference
    #[arg(long)]
    metadata_model: Option<String>,

    /// Override model for classification
    #[arg(long)]
    classification_model: Option<String>,

    /// Page budget for PDF text extraction
    #[arg(long, default_value_t = 10)]
    max_pages: usize,

    /// Sweep the inbox once and exit (the default)
    #[arg(long, conflicts_with = "watch")]
    once: bool,

    /// Keep watching the inbox for new files after the initial sweep
    #[arg(long)]
    watch: bool,

    /// Ollama base URL
    #[arg(long, env = "OLLAMA_BASE_URL", default_value = "http://localhost:11434")]
    ollama_url: String,

    /// Stirling-PDF base URL
    #[arg(long, env = "STIRLING_BASE_URL", default_value = "http://localhost:8080")]
    stirling_url: String,

    /// SQLite file holding per-document checkpoints
    #[arg(long, value_name = "FILE", default_value = "checkpoints/checkpoints.sqlite")]
    checkpoint_db: PathBuf,
}

impl Cli {
    fn into_config(self) -> RunConfig {
        RunConfig {
            input_dir: self.input_dir,
            pdf_output_dir: self.pdf_output_dir,
            ebook_output_dir: self.ebook_output_dir,
            default_model: self.default_model,
            metadata_model: self.metadata_model,
            classification_model: self.classification_model,
            max_pages: self.max_pages,
            ollama_url: self.ollama_url,
            stirling_url: self.stirling_url,
            checkpoint_db: self.checkpoint_db,
        }
    }
}

fn prepare_directories(config: &RunConfig) -> std::io::Result<()> {
    std::fs::create_dir_all(&config.input_dir)?;
    std::fs::create_dir_all(&config.pdf_output_dir)?;
    std::fs::create_dir_all(&config.ebook_output_dir)?;
    if let Some(parent) = config.checkpoint_db.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    let cli = Cli::parse();
    let watch = cli.watch;
    let config = cli.into_config();

    if let Err(e) = prepare_directories(&config) {
        tracing::error!(error = %e, "Could not create working directories");
        return ExitCode::FAILURE;
    }

    let in_flight = ingest::new_in_flight();
    ingest::sweep(&config, &in_flight);

    if watch {
        ingest::start_watching(config, in_flight).wait();
    }

    ExitCode::SUCCESS
}
