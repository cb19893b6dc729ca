//! Upload ingestion: extract → chunk → embed → store.
//!
//! A batch of uploaded files is extracted and chunked file by file, then every
//! chunk of the batch is handed to [`KnowledgeStore::add`] in one call, so a
//! batch either lands completely or not at all. Per-file problems never abort
//! the batch: unsupported extensions are listed in [`IngestReport::skipped`]
//! and extraction failures in [`IngestReport::failed`].

use thiserror::Error;

use crate::chunk::{chunk_text, ChunkError};
use crate::config::ChunkingConfig;
use crate::extract::{extract_text, Extracted};
use crate::models::UploadedFile;
use crate::store::{KnowledgeStore, StoreError};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Chunk(#[from] ChunkError),
    #[error("failed to add chunks to knowledge base: {0}")]
    Store(#[from] StoreError),
}

/// Chunk count for one ingested file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChunks {
    pub name: String,
    pub chunks: usize,
}

/// A file whose text could not be extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFile {
    pub name: String,
    pub error: String,
}

/// Summary of one ingestion batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Files that produced at least one chunk, in upload order.
    pub files: Vec<FileChunks>,
    /// Unsupported extensions and files with no text.
    pub skipped: Vec<String>,
    pub failed: Vec<FailedFile>,
    pub chunks_added: usize,
}

impl IngestReport {
    pub fn files_ingested(&self) -> usize {
        self.files.len()
    }
}

/// Chunks for a batch, not yet embedded.
#[derive(Debug, Default)]
pub struct PreparedBatch {
    pub chunks: Vec<String>,
    pub report: IngestReport,
}

/// Extract and chunk `files` without touching a store.
///
/// `report.chunks_added` is the number of chunks that *would* be added.
pub fn prepare_batch(
    files: &[UploadedFile],
    chunking: &ChunkingConfig,
) -> Result<PreparedBatch, ChunkError> {
    crate::chunk::validate(chunking.chunk_size, chunking.overlap)?;

    let mut batch = PreparedBatch::default();
    for file in files {
        let text = match extract_text(&file.name, &file.bytes) {
            Ok(Extracted::Text(text)) => text,
            Ok(Extracted::Unsupported) => {
                tracing::warn!(file = %file.name, "unsupported file type, skipping");
                batch.report.skipped.push(file.name.clone());
                continue;
            }
            Err(e) => {
                tracing::warn!(file = %file.name, error = %e, "extraction failed");
                batch.report.failed.push(FailedFile {
                    name: file.name.clone(),
                    error: e.to_string(),
                });
                continue;
            }
        };

        if text.trim().is_empty() {
            tracing::warn!(file = %file.name, "no extractable text, skipping");
            batch.report.skipped.push(file.name.clone());
            continue;
        }

        let chunks = chunk_text(&text, chunking.chunk_size, chunking.overlap)?;
        tracing::debug!(file = %file.name, chars = text.chars().count(), chunks = chunks.len(), "chunked");
        batch.report.files.push(FileChunks {
            name: file.name.clone(),
            chunks: chunks.len(),
        });
        batch.chunks.extend(chunks);
    }
    batch.report.chunks_added = batch.chunks.len();
    Ok(batch)
}

/// Ingest a batch of uploads into `store`.
pub async fn ingest_files(
    files: &[UploadedFile],
    store: &KnowledgeStore,
    chunking: &ChunkingConfig,
) -> Result<IngestReport, IngestError> {
    let PreparedBatch { chunks, report } = prepare_batch(files, chunking)?;
    store.add(&chunks).await?;

    tracing::info!(
        files = report.files_ingested(),
        chunks = report.chunks_added,
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        store_size = store.size(),
        "ingestion complete"
    );
    Ok(report)
}
