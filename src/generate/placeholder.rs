use async_trait::async_trait;

use crate::error::Result;
use crate::generate::{GenerationRequest, Generator};

pub const PLACEHOLDER_ANSWER: &str =
    "[Local LLM missing: start a llama.cpp server with a GGUF model and set DOCCHAT_LLM_URL]";

/// Stands in for the language model when none is configured.
pub struct PlaceholderGenerator;

#[async_trait]
impl Generator for PlaceholderGenerator {
    async fn generate(&self, _request: &GenerationRequest<'_>) -> Result<String> {
        Ok(PLACEHOLDER_ANSWER.to_string())
    }

    fn name(&self) -> &str {
        "placeholder"
    }
}
