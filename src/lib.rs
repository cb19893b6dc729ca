//! # ragchat
//!
//! A retrieval-augmented chat assistant with an in-memory knowledge base and a
//! web-search fallback.
//!
//! Uploaded documents (PDF, TXT, CSV) are extracted, split into overlapping
//! character windows, embedded, and kept in a process-lifetime vector store.
//! Each user question is answered from the most similar chunks; when the model
//! says it does not know, a web search supplies extra context for a second
//! attempt.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌────────────────┐
//! │ Uploads  │──▶│  Pipeline   │──▶│ KnowledgeStore │
//! │ PDF/TXT/ │   │ Chunk+Embed │   │  (in memory)   │
//! │   CSV    │   └─────────────┘   └───────┬────────┘
//! └──────────┘                             │
//!                                          ▼
//!                 ┌──────────┐      ┌─────────────┐      ┌────────────┐
//!   question ────▶│Retriever │─────▶│ Orchestrator│◀────▶│ Web search │
//!                 └──────────┘      └──────┬──────┘      └────────────┘
//!                                          ▼
//!                                   ┌─────────────┐
//!                                   │  Chat model │
//!                                   └─────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF, text, and CSV extraction |
//! | [`chunk`] | Overlapping character-window chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | In-memory vector store |
//! | [`ingest`] | Upload ingestion pipeline |
//! | [`retrieve`] | Query-time context retrieval |
//! | [`web_search`] | Web search fallback client |
//! | [`llm`] | Chat completion client |
//! | [`orchestrator`] | Answer pipeline with web fallback |
//! | [`commands`] | CLI command runners |

pub mod chunk;
pub mod commands;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod retrieve;
pub mod store;
pub mod web_search;
