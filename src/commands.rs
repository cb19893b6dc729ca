//! Command runners behind the `ragchat` binary.
//!
//! Each `run_*` function takes the loaded [`Config`], wires the pipeline
//! together, and prints results to stdout. Diagnostics go through `tracing`
//! (stderr) so stdout carries only answers and reports.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::ingest::{ingest_files, prepare_batch, IngestReport};
use crate::llm::ChatCompletionsClient;
use crate::models::{ChatMessage, ResponseMode, UploadedFile};
use crate::orchestrator::{Orchestrator, OrchestratorSettings};
use crate::retrieve::Retriever;
use crate::store::KnowledgeStore;
use crate::web_search::{HttpWebSearch, NO_RESULTS};

const INSTRUCTIONS: &str = "\
1. Upload your knowledge base documents with --file (PDF, TXT or CSV).
2. Ask questions: answers use your documents first.
3. If the documents don't have the answer, a web search is tried.
Commands: /clear  /mode concise|detailed  /help  /quit";

/// Read files from disk as uploads, named by their file name.
pub fn read_uploads(paths: &[PathBuf]) -> Result<Vec<UploadedFile>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        files.push(UploadedFile::new(upload_name(path), bytes));
    }
    Ok(files)
}

fn upload_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Build an empty store with the configured embedder.
pub fn build_store(config: &Config) -> Result<Arc<KnowledgeStore>> {
    let embedder = create_embedder(&config.embedding)?;
    tracing::debug!(model = embedder.model_name(), dims = embedder.dims(), "embedder ready");
    Ok(Arc::new(KnowledgeStore::new(embedder)))
}

/// Wire the retriever, web search, and language model around `store`.
///
/// Fails when the language model client cannot be initialized.
pub fn build_orchestrator(config: &Config, store: Arc<KnowledgeStore>) -> Result<Orchestrator> {
    let model = ChatCompletionsClient::from_env(&config.llm)?;
    let web = HttpWebSearch::from_env(&config.web_search)?;
    let retriever = Retriever::new(store, config.retrieval.top_k);
    Ok(Orchestrator::new(
        retriever,
        Arc::new(web),
        Arc::new(model),
        OrchestratorSettings::from_config(config),
    ))
}

/// Ingest `paths` into `store` and print the upload summary.
async fn upload(config: &Config, store: &KnowledgeStore, paths: &[PathBuf]) -> Result<()> {
    if paths.is_empty() {
        return Ok(());
    }
    let files = read_uploads(paths)?;
    let report = ingest_files(&files, store, &config.chunking).await?;
    print_problems(&report);
    println!(
        "{} documents added to knowledge base",
        report.files_ingested()
    );
    Ok(())
}

fn print_problems(report: &IngestReport) {
    for name in &report.skipped {
        println!("skipped: {}", name);
    }
    for failed in &report.failed {
        println!("failed: {} ({})", failed.name, failed.error);
    }
}

/// `ragchat ingest`: extract and chunk only.
pub fn run_ingest(config: &Config, paths: &[PathBuf]) -> Result<()> {
    let files = read_uploads(paths)?;
    let batch = prepare_batch(&files, &config.chunking)?;
    let report = batch.report;

    for file in &report.files {
        println!("{}: {} chunks", file.name, file.chunks);
    }
    print_problems(&report);
    println!(
        "files: {}  chunks: {}  skipped: {}  failed: {}",
        report.files_ingested(),
        report.chunks_added,
        report.skipped.len(),
        report.failed.len()
    );
    Ok(())
}

/// `ragchat search`: ingest and print scored hits.
pub async fn run_search(
    config: &Config,
    query: &str,
    paths: &[PathBuf],
    top_k: Option<usize>,
) -> Result<()> {
    let store = build_store(config)?;
    upload(config, &store, paths).await?;

    let top_k = top_k.unwrap_or(config.retrieval.top_k);
    let retriever = Retriever::new(store, top_k);
    let hits = retriever.hits(query, top_k).await?;
    if hits.is_empty() {
        println!("{}", NO_RESULTS);
        return Ok(());
    }
    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.3}] chunk {}", i + 1, hit.score, hit.index);
        println!("    \"{}\"", hit.text.replace('\n', " ").trim());
    }
    Ok(())
}

/// `ragchat ask`: one question, one answer.
pub async fn run_ask(
    config: &Config,
    question: &str,
    paths: &[PathBuf],
    mode: ResponseMode,
) -> Result<()> {
    let store = build_store(config)?;
    let orchestrator = build_orchestrator(config, store.clone())?;
    upload(config, &store, paths).await?;

    let answer = orchestrator
        .respond(&[ChatMessage::user(question)], mode)
        .await;
    println!("{}", answer);
    Ok(())
}

/// `ragchat chat`: interactive session on stdin.
pub async fn run_chat(config: &Config, paths: &[PathBuf], mode: ResponseMode) -> Result<()> {
    let store = build_store(config)?;
    let orchestrator = build_orchestrator(config, store.clone())?;
    upload(config, &store, paths).await?;

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut session = ChatSession::new(mode);
    session
        .run(&orchestrator, stdin, &mut std::io::stdout())
        .await
}

/// One line of chat input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Message(String),
    Clear,
    Mode(ResponseMode),
    Help,
    Quit,
    Empty,
    Invalid(String),
}

impl Input {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Input::Empty;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Input::Message(line.to_string());
        };
        let mut parts = command.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("clear"), None) => Input::Clear,
            (Some("help"), None) => Input::Help,
            (Some("quit" | "exit"), None) => Input::Quit,
            (Some("mode"), Some(mode)) => match mode.parse() {
                Ok(mode) => Input::Mode(mode),
                Err(e) => Input::Invalid(e),
            },
            _ => Input::Invalid(format!("unknown command: {}", line)),
        }
    }
}

/// Conversation state for the interactive loop.
pub struct ChatSession {
    pub history: Vec<ChatMessage>,
    pub mode: ResponseMode,
}

impl ChatSession {
    pub fn new(mode: ResponseMode) -> Self {
        Self {
            history: Vec::new(),
            mode,
        }
    }

    /// Read lines from `input` until EOF or `/quit`, answering each message.
    pub async fn run<R, W>(
        &mut self,
        orchestrator: &Orchestrator,
        input: R,
        out: &mut W,
    ) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        writeln!(out, "Response Mode: {}", self.mode.label())?;
        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await? {
            match Input::parse(&line) {
                Input::Empty => continue,
                Input::Quit => break,
                Input::Help => writeln!(out, "{}", INSTRUCTIONS)?,
                Input::Clear => {
                    self.history.clear();
                    writeln!(out, "Chat history cleared.")?;
                }
                Input::Mode(mode) => {
                    self.mode = mode;
                    writeln!(out, "Response Mode: {}", mode.label())?;
                }
                Input::Invalid(msg) => writeln!(out, "{}", msg)?,
                Input::Message(text) => {
                    self.history.push(ChatMessage::user(text));
                    let reply = orchestrator.respond(&self.history, self.mode).await;
                    writeln!(out, "{}", reply)?;
                    self.history.push(ChatMessage::assistant(reply));
                }
            }
            out.flush()?;
        }
        Ok(())
    }
}
