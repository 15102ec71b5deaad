//! Text generation providers.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Settings;
use crate::error::Result;

mod llama;
mod placeholder;

pub use llama::LlamaServerGenerator;
pub use placeholder::{PlaceholderGenerator, PLACEHOLDER_ANSWER};

/// Request envelope shared by the providers.
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    pub prompt: &'a str,
    pub max_tokens: usize,
    pub temperature: f32,
    pub stop: &'a [&'a str],
}

/// Produces a completion for an assembled prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String>;

    fn name(&self) -> &str;
}

/// A llama.cpp server when `llm_url` is configured, the placeholder otherwise.
pub fn from_settings(settings: &Settings) -> Result<Arc<dyn Generator>> {
    match &settings.llm_url {
        Some(url) => Ok(Arc::new(LlamaServerGenerator::new(
            url,
            settings.llm_model.clone(),
            settings.generation_timeout(),
        )?)),
        None => {
            tracing::warn!("no DOCCHAT_LLM_URL configured; answers will be a placeholder notice");
            Ok(Arc::new(PlaceholderGenerator))
        }
    }
}
