//! # Compliance Harness CLI (`comply`)
//!
//! The `comply` binary is the primary interface for Compliance Harness. It
//! provides commands for storage initialization, running compliance
//! analyses, inspecting the vector index, listing reports, and starting
//! the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! comply --config ./config/comply.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `comply init` | Create storage directories and run schema migrations |
//! | `comply analyze <sop>` | Analyze an SOP against regulatory documents |
//! | `comply reports` | List saved compliance reports |
//! | `comply index verify` | Check vector index consistency |
//! | `comply index remove <doc_id>` | Remove a document from the index |
//! | `comply serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize storage and the database
//! comply init --config ./config/comply.toml
//!
//! # Analyze against explicit regulation files
//! comply analyze sop.pdf --regulatory gmp.pdf --regulatory fda.docx
//!
//! # Analyze against every document in a directory
//! comply analyze sop.pdf --regulatory-dir ./storage/regulatory
//!
//! # Start the HTTP server
//! comply serve --config ./config/comply.toml
//! ```

mod analyze;
mod chunk;
mod clause;
mod config;
mod document;
mod embedding;
mod extract;
mod files;
mod index;
mod llm;
mod migrate;
mod models;
mod report;
mod retrieve;
mod server;
mod status;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use index::VectorIndex;
use llm::LlmService;
use status::StatusStore;

/// Compliance Harness CLI — analyze Standard Operating Procedures against
/// regulatory documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/comply.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "comply",
    about = "Compliance Harness — SOP-to-regulation compliance analysis",
    version,
    long_about = "Compliance Harness extracts text from SOP and regulatory documents \
    (PDF, DOCX, plain text), splits regulations into clauses, indexes the clauses as \
    deterministic embedding vectors in SQLite, retrieves the clauses relevant to an SOP, \
    and produces an LLM-backed compliance report via a CLI and JSON HTTP server."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/comply.toml`. Storage, chunking, retrieval,
    /// embedding, LLM, and server settings are read from this file.
    #[arg(long, global = true, default_value = "./config/comply.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize storage directories and the database schema.
    ///
    /// Creates the storage tree (sop, regulatory, processed, reports) and
    /// the SQLite database with its vector tables. Idempotent — running
    /// it multiple times is safe.
    Init,

    /// Analyze an SOP against regulatory documents.
    ///
    /// Processes the documents (cached by content hash), indexes the
    /// regulatory clauses, retrieves the clauses relevant to the SOP, and
    /// produces a compliance report. Prints a summary and saves the full
    /// report under the reports directory.
    Analyze {
        /// Path to the SOP document (PDF, DOCX, or plain text).
        sop: PathBuf,

        /// A regulatory document to analyze against. Repeatable.
        #[arg(long = "regulatory")]
        regulatory: Vec<PathBuf>,

        /// Analyze against every file in this directory. Defaults to the
        /// configured regulatory storage directory when no --regulatory
        /// files are given.
        #[arg(long = "regulatory-dir")]
        regulatory_dir: Option<PathBuf>,
    },

    /// List saved compliance reports, newest first.
    Reports,

    /// Inspect or repair the vector index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Start the HTTP server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// upload, analysis, and report endpoints.
    Serve,
}

/// Vector index subcommands.
#[derive(Subcommand)]
enum IndexAction {
    /// Check that the vector table and the indexed-document set agree.
    ///
    /// Reports document ids that are marked indexed without vectors, and
    /// vectors whose document id is missing from the set. Detection only;
    /// nothing is modified.
    Verify,

    /// Remove one document's vectors and its indexed-set entry.
    ///
    /// The document id is the content hash printed by `index verify` and
    /// stored in reports.
    Remove {
        /// Document id (content hash).
        doc_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            cfg.storage.ensure_dirs()?;
            // Opening the index creates the database and applies migrations.
            VectorIndex::open(&cfg).await?.close().await;
            println!("Storage initialized at {}", cfg.storage.root.display());
        }
        Commands::Analyze {
            sop,
            regulatory,
            regulatory_dir,
        } => {
            run_analyze(&cfg, sop, regulatory, regulatory_dir).await?;
        }
        Commands::Reports => {
            let summaries = report::list_reports(&cfg)?;
            if summaries.is_empty() {
                println!("No reports found.");
            } else {
                for s in summaries {
                    let score = s
                        .compliance_score
                        .map(|v| format!("{}/100", v))
                        .unwrap_or_else(|| "-".to_string());
                    let note = if s.error.is_some() { "  (degraded)" } else { "" };
                    println!("{}  {}  {}  {}{}", s.job_id, s.status, score, s.sop_file, note);
                }
            }
        }
        Commands::Index { action } => match action {
            IndexAction::Verify => {
                let index = VectorIndex::open(&cfg).await?;
                let findings = index.verify().await?;
                if findings.is_empty() {
                    println!("Index is consistent.");
                } else {
                    for finding in &findings {
                        println!("{}", finding);
                    }
                    bail!("{} inconsistencies found", findings.len());
                }
            }
            IndexAction::Remove { doc_id } => {
                let index = VectorIndex::open(&cfg).await?;
                if index.delete(&doc_id).await? {
                    println!("Removed {}", doc_id);
                } else {
                    println!("Document not indexed: {}", doc_id);
                }
            }
        },
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

/// Run one analysis from the command line and print a report summary.
async fn run_analyze(
    cfg: &config::Config,
    sop: PathBuf,
    regulatory: Vec<PathBuf>,
    regulatory_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    if !sop.exists() {
        bail!("SOP file not found: {}", sop.display());
    }

    let mut regulatory_paths = regulatory;
    if regulatory_paths.is_empty() {
        let dir = regulatory_dir.unwrap_or_else(|| cfg.storage.regulatory_dir());
        if dir.exists() {
            for entry in std::fs::read_dir(&dir)
                .with_context(|| format!("listing {}", dir.display()))?
            {
                let path = entry?.path();
                if path.is_file() {
                    regulatory_paths.push(path);
                }
            }
        }
        if regulatory_paths.is_empty() {
            bail!("No regulatory documents found in {}", dir.display());
        }
    }
    regulatory_paths.sort();

    println!("Found SOP file: {}", sop.display());
    println!("Found {} regulatory documents", regulatory_paths.len());

    cfg.storage.ensure_dirs()?;
    let index = VectorIndex::open(cfg).await?;
    let llm = LlmService::new(&cfg.llm, &cfg.retrieval);
    let status = StatusStore::new(cfg);
    let job_id = analyze::allocate_job_id();

    println!("\nStarting analysis...");
    let result = analyze::run_analysis(
        cfg,
        &index,
        &llm,
        &status,
        &job_id,
        &sop,
        &regulatory_paths,
    )
    .await?;

    println!("\nAnalysis complete!");
    println!(
        "Report saved to: {}",
        report::report_path(cfg, &job_id).display()
    );

    let analysis = &result.analysis;
    println!("\nCompliance Summary:");
    println!("{}", analysis.compliance_summary);
    println!("\nCompliance Score: {}/100", analysis.compliance_score);

    if !analysis.discrepancies.is_empty() {
        println!("\nTop Discrepancies:");
        for (i, d) in analysis.discrepancies.iter().take(3).enumerate() {
            println!("{}. {} (Severity: {})", i + 1, d.issue, d.severity);
        }
    }
    if !analysis.recommended_adjustments.is_empty() {
        println!("\nTop Recommendations:");
        for (i, a) in analysis.recommended_adjustments.iter().take(3).enumerate() {
            println!("{}. {}", i + 1, a.explanation);
        }
    }
    if let Some(err) = &analysis.error {
        println!("\nAnalysis degraded: {}", err);
    }

    Ok(())
}
