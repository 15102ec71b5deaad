//! Query → retrieval → prompt → generation.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::config::{Number, Settings};
use crate::embed::Embedder;
use crate::error::{Error, Result};
use crate::generate::{GenerationRequest, Generator};
use crate::index::SharedIndex;
use crate::search::ScoredChunk;
use crate::session::{SessionStore, Turn};

const STOP_SEQUENCES: &[&str] = &["</s>"];

#[derive(Debug, Clone, Serialize)]
pub struct Source {
    pub chunk_id: String,
    pub file_name: String,
    pub score: Number,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub session_id: Uuid,
    pub answer: String,
    pub chunk_ids: Vec<String>,
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone, Copy)]
pub struct RagOptions {
    pub top_k: usize,
    pub max_tokens: usize,
    pub temperature: f32,
    pub history_turns: usize,
    pub generation_timeout: Duration,
}

impl RagOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            top_k: settings.top_k,
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            history_turns: settings.history_turns,
            generation_timeout: settings.generation_timeout(),
        }
    }
}

pub struct RagOrchestrator {
    embedder: Arc<dyn Embedder>,
    index: SharedIndex,
    generator: Arc<dyn Generator>,
    sessions: Arc<SessionStore>,
    options: RagOptions,
}

/// Fixed prompt template. The conversation block only appears when the
/// session already has turns.
pub fn build_prompt(chunks: &[ScoredChunk], history: &[Turn], question: &str) -> String {
    let context = chunks
        .iter()
        .map(|c| c.chunk.text.trim())
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut prompt = format!(
        "You are a helpful assistant. Use the context to answer the question.\n\nCONTEXT:\n{context}\n\n"
    );
    if !history.is_empty() {
        prompt.push_str("CONVERSATION:\n");
        for turn in history {
            prompt.push_str(turn.role.as_str());
            prompt.push_str(": ");
            prompt.push_str(turn.content.trim());
            prompt.push('\n');
        }
        prompt.push('\n');
    }
    prompt.push_str(&format!("QUESTION: {question}\n\nANSWER:"));
    prompt
}

impl RagOrchestrator {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: SharedIndex,
        generator: Arc<dyn Generator>,
        sessions: Arc<SessionStore>,
        options: RagOptions,
    ) -> Self {
        Self {
            embedder,
            index,
            generator,
            sessions,
            options,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    fn ensure_not_empty(&self) -> Result<()> {
        let index = self
            .index
            .read()
            .map_err(|_| Error::Index("index lock poisoned".to_string()))?;
        if index.is_empty() {
            return Err(Error::Index("index is empty; upload a document first".to_string()));
        }
        Ok(())
    }

    /// Embeds `query` and returns the `k` nearest chunks. Runs on a blocking
    /// thread because both steps are CPU-bound.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let embedder = self.embedder.clone();
        let index = self.index.clone();
        let query = query.to_string();
        tokio::task::spawn_blocking(move || {
            let vector = embedder.embed_query(&query)?;
            let index = index
                .read()
                .map_err(|_| Error::Index("index lock poisoned".to_string()))?;
            index.query(&vector, k)
        })
        .await
        .map_err(|e| Error::Embedding(format!("retrieval task failed: {e}")))?
    }

    pub async fn ask(&self, question: &str, session_id: Option<&str>) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::InvalidInput("message cannot be empty".to_string()));
        }
        self.ensure_not_empty()?;
        // a new session is only created once there is an answer to record
        let existing = match session_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(raw) => Some(self.sessions.resolve(Some(raw))?),
            None => None,
        };

        let retrieved = self.retrieve(question, self.options.top_k).await?;
        let history = match &existing {
            Some(id) => self
                .sessions
                .recent_turns(id, self.options.history_turns)
                .unwrap_or_default(),
            None => Vec::new(),
        };
        let prompt = build_prompt(&retrieved, &history, question);

        let request = GenerationRequest {
            prompt: &prompt,
            max_tokens: self.options.max_tokens,
            temperature: self.options.temperature,
            stop: STOP_SEQUENCES,
        };
        let timeout = self.options.generation_timeout;
        let answer = tokio::time::timeout(timeout, self.generator.generate(&request))
            .await
            .map_err(|_| Error::GenerationTimeout(timeout.as_secs()))??;

        let session_id = self.sessions.record(
            existing,
            [Turn::user(question), Turn::assistant(answer.clone())],
        );

        tracing::info!(
            session_id = %session_id,
            retrieved = retrieved.len(),
            generator = self.generator.name(),
            "question answered"
        );

        Ok(Answer {
            session_id,
            answer,
            chunk_ids: retrieved.iter().map(|r| r.chunk.id.clone()).collect(),
            sources: retrieved
                .iter()
                .map(|r| Source {
                    chunk_id: r.chunk.id.clone(),
                    file_name: r.chunk.file_name.clone(),
                    score: r.score,
                })
                .collect(),
        })
    }
}
