//! Core data models used throughout ragchat.
//!
//! These types represent the chat messages, uploaded files, and answers that
//! flow through the ingestion and query pipelines.

use serde::{Deserialize, Serialize};

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// How verbose answers should be.
///
/// Each mode maps to a fixed base system prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    #[default]
    Concise,
    Detailed,
}

impl ResponseMode {
    /// Base system prompt for this mode.
    pub fn system_prompt(self) -> &'static str {
        match self {
            ResponseMode::Concise => {
                "You are a helpful assistant. Keep answers short and summarized."
            }
            ResponseMode::Detailed => {
                "You are a helpful assistant. Provide expanded, detailed explanations."
            }
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ResponseMode::Concise => "Concise",
            ResponseMode::Detailed => "Detailed",
        }
    }
}

impl std::str::FromStr for ResponseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "concise" => Ok(ResponseMode::Concise),
            "detailed" => Ok(ResponseMode::Detailed),
            other => Err(format!(
                "unknown response mode '{}': expected concise or detailed",
                other
            )),
        }
    }
}

/// A file handed to the ingestion pipeline: a name used for type dispatch
/// plus its raw bytes.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Terminal state reached by the answer pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerStage {
    /// The first model call, grounded on local documents only, was accepted.
    RagAnswered,
    /// The first answer was uncertain; the returned text came from a second
    /// call with web search results appended.
    WebAugmented,
}

/// Final answer text plus the stage that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    pub stage: AnswerStage,
}

/// A scored match from the knowledge store.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Insertion index of the chunk in the store.
    pub index: usize,
    /// Cosine similarity to the query.
    pub score: f32,
    pub text: String,
}
