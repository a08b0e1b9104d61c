use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use toolz_common::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub model: Option<String>,
    pub tokens_used: Option<u32>,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a response to the given prompt with optional system prompt
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<LlmResponse>;

    /// Get the model name being used
    fn model_name(&self) -> &str;

    /// System prompt used when commenting on landing pages
    fn default_analyst_system_prompt(&self) -> &str {
        r#"You are a senior conversion-rate and web-quality consultant reviewing landing pages.

Guidelines:
- Base every observation on the supplied page content and metadata
- Be specific: quote headings or copy when you criticise them
- Prefer concrete, prioritised recommendations over generic advice
- Say so when the supplied content looks incomplete or was not fully rendered"#
    }
}
