//! Answer orchestration: retrieval, generation, and the web-search fallback.
//!
//! One call to [`Orchestrator::answer`] walks a small state machine:
//!
//! ```text
//! INITIAL ──retrieve + generate──▶ RAG_ANSWERED ──(uncertain)──▶ WEB_AUGMENTED_ANSWERED
//!                                       │
//!                                       └──(confident)──▶ done
//! ```
//!
//! The first pass grounds the model on local document context only. If the
//! reply is empty or is one of the configured uncertainty phrases (compared
//! case-insensitively after trimming), the orchestrator runs a web search for
//! the same query, appends the snippets to the context, and asks again. The
//! second reply is final.
//!
//! [`Orchestrator::get_chat_response`] is the query interface for front ends:
//! it never fails, collapsing any error into `"Error getting response: ..."`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::Config;
use crate::embedding::EmbeddingError;
use crate::llm::{ChatModel, LlmError};
use crate::models::{Answer, AnswerStage, ChatMessage, ResponseMode, Role};
use crate::retrieve::{RetrievalError, Retriever};
use crate::web_search::{WebSearchError, WebSearcher};

/// Prefix of every degraded response returned by
/// [`Orchestrator::get_chat_response`].
pub const ERROR_PREFIX: &str = "Error getting response: ";

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("{0}")]
    Retrieval(#[from] RetrievalError),
    #[error("{0}")]
    Model(#[from] LlmError),
    #[error("{0}")]
    WebSearch(#[from] WebSearchError),
}

/// Tunables for the answer pipeline.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub num_results: usize,
    pub uncertainty_phrases: Vec<String>,
    pub retrieval_timeout: Duration,
    pub model_timeout: Duration,
    pub search_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            num_results: config.web_search.num_results,
            uncertainty_phrases: config
                .chat
                .uncertainty_phrases
                .iter()
                .map(|p| p.trim().to_lowercase())
                .collect(),
            retrieval_timeout: Duration::from_secs(config.embedding.timeout_secs),
            model_timeout: Duration::from_secs(config.llm.timeout_secs),
            search_timeout: Duration::from_secs(config.web_search.timeout_secs),
        }
    }
}

/// Composes retrieval, the language model, and web search into answers.
pub struct Orchestrator {
    retriever: Retriever,
    web: Arc<dyn WebSearcher>,
    model: Arc<dyn ChatModel>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        retriever: Retriever,
        web: Arc<dyn WebSearcher>,
        model: Arc<dyn ChatModel>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            retriever,
            web,
            model,
            settings,
        }
    }

    /// Answer the latest user message, degrading every failure to text.
    pub async fn get_chat_response(&self, messages: &[ChatMessage], system_prompt: &str) -> String {
        match self.answer(messages, system_prompt).await {
            Ok(answer) => answer.text,
            Err(e) => {
                tracing::warn!(error = %e, "answer pipeline failed");
                format!("{}{}", ERROR_PREFIX, e)
            }
        }
    }

    /// [`get_chat_response`](Self::get_chat_response) with the base prompt for `mode`.
    pub async fn respond(&self, messages: &[ChatMessage], mode: ResponseMode) -> String {
        self.get_chat_response(messages, mode.system_prompt()).await
    }

    /// Run the pipeline and report which stage produced the answer.
    pub async fn answer(
        &self,
        messages: &[ChatMessage],
        system_prompt: &str,
    ) -> Result<Answer, OrchestratorError> {
        let user_query = latest_user_query(messages);

        let rag_context = if user_query.trim().is_empty() {
            String::new()
        } else {
            let timeout = self.settings.retrieval_timeout;
            bounded(timeout, self.retriever.retrieve(user_query), || {
                RetrievalError::Embedding(EmbeddingError::Timeout(timeout))
            })
            .await?
        };

        let full_prompt = if rag_context.is_empty() {
            system_prompt.to_string()
        } else {
            format!("{}\n\nContext:\n{}", system_prompt, rag_context)
        };
        tracing::debug!(
            context_chars = rag_context.len(),
            history = messages.len(),
            "generating first answer"
        );

        let first = self.generate(&full_prompt, messages).await?;
        if !self.is_uncertain(&first) {
            return Ok(Answer {
                text: first,
                stage: AnswerStage::RagAnswered,
            });
        }

        tracing::info!("first answer uncertain, falling back to web search");
        let timeout = self.settings.search_timeout;
        let snippets = bounded(
            timeout,
            self.web.search(user_query, self.settings.num_results),
            || WebSearchError::Timeout(timeout),
        )
        .await?;
        let search_context = match snippets {
            Some(snippets) => snippets.join("\n"),
            None => String::new(),
        };

        let fallback_prompt = format!(
            "{}\n\nContext:\n{}\n{}",
            system_prompt, rag_context, search_context
        );
        let second = self.generate(&fallback_prompt, messages).await?;
        Ok(Answer {
            text: second,
            stage: AnswerStage::WebAugmented,
        })
    }

    /// One model call: the fresh system prompt replaces a leading system
    /// message in the history. Returns trimmed text.
    async fn generate(&self, prompt: &str, history: &[ChatMessage]) -> Result<String, LlmError> {
        let replay = match history.first() {
            Some(first) if first.role == Role::System => &history[1..],
            _ => history,
        };
        let mut request = Vec::with_capacity(replay.len() + 1);
        request.push(ChatMessage::system(prompt));
        request.extend_from_slice(replay);

        let timeout = self.settings.model_timeout;
        let text = bounded(timeout, self.model.complete(&request), || {
            LlmError::Timeout(timeout)
        })
        .await?;
        Ok(text.trim().to_string())
    }

    fn is_uncertain(&self, text: &str) -> bool {
        if text.is_empty() {
            return true;
        }
        let lowered = text.to_lowercase();
        self.settings
            .uncertainty_phrases
            .iter()
            .any(|p| *p == lowered)
    }
}

/// Content of the most recent user message, or `""` if there is none.
fn latest_user_query(messages: &[ChatMessage]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or("")
}

/// Await `fut` for at most `limit`, mapping an elapsed deadline with `on_timeout`.
async fn bounded<T, E, F>(
    limit: Duration,
    fut: F,
    on_timeout: impl FnOnce() -> E,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout()),
    }
}
