//! # ragchat CLI
//!
//! Chat with your documents: upload PDFs, text files, or CSVs into an
//! in-memory knowledge base and ask questions about them. When the documents
//! don't answer a question, a web search is tried.
//!
//! ## Usage
//!
//! ```bash
//! ragchat --config ./config/ragchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragchat chat --file F...` | Interactive chat over the uploaded files |
//! | `ragchat ask "<question>"` | Answer a single question |
//! | `ragchat ingest <files>...` | Extract and chunk files, print chunk counts |
//! | `ragchat search "<query>"` | Print the chunks retrieval would use |
//! | `ragchat completions <shell>` | Print shell completions |
//!
//! `GROQ_API_KEY` is required for `chat` and `ask`; `SERPAPI_API_KEY`
//! authenticates the web search fallback. Set `RUST_LOG` (e.g.
//! `RUST_LOG=ragchat=debug`) to see pipeline diagnostics on stderr.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use ragchat::commands;
use ragchat::config;
use ragchat::models::ResponseMode;

/// ragchat: retrieval-augmented chat over your own documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/ragchat.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "ragchat",
    about = "Retrieval-augmented chat over your documents, with a web search fallback",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/ragchat.toml`. A missing file means all defaults.
    #[arg(long, global = true, default_value = "./config/ragchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session.
    ///
    /// Lines typed on stdin are questions. `/clear` clears the history,
    /// `/mode concise|detailed` switches the response mode, `/help` prints
    /// instructions, and `/quit` exits.
    Chat {
        /// Document to add to the knowledge base (PDF, TXT, CSV). Repeatable.
        #[arg(long = "file", short = 'f')]
        files: Vec<PathBuf>,

        /// Initial response mode (defaults to `[chat].response_mode`).
        #[arg(long, value_enum)]
        mode: Option<ResponseMode>,
    },

    /// Ask a single question and print the answer.
    Ask {
        question: String,

        /// Document to add to the knowledge base (PDF, TXT, CSV). Repeatable.
        #[arg(long = "file", short = 'f')]
        files: Vec<PathBuf>,

        #[arg(long, value_enum)]
        mode: Option<ResponseMode>,
    },

    /// Extract and chunk files without embedding them.
    ///
    /// Prints per-file chunk counts. Makes no network calls.
    Ingest {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Ingest files and print the best-matching chunks for a query.
    Search {
        query: String,

        #[arg(long = "file", short = 'f')]
        files: Vec<PathBuf>,

        /// Number of chunks to return (defaults to `[retrieval].top_k`).
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Print shell completions to stdout.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "ragchat", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Chat { files, mode } => {
            let mode = mode.unwrap_or(cfg.chat.response_mode);
            commands::run_chat(&cfg, &files, mode).await?;
        }
        Commands::Ask {
            question,
            files,
            mode,
        } => {
            let mode = mode.unwrap_or(cfg.chat.response_mode);
            commands::run_ask(&cfg, &question, &files, mode).await?;
        }
        Commands::Ingest { files } => {
            commands::run_ingest(&cfg, &files)?;
        }
        Commands::Search {
            query,
            files,
            top_k,
        } => {
            commands::run_search(&cfg, &query, &files, top_k).await?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
