//! Provider‑agnostic LLM integration for Toolz.
//!
//! This crate exposes a common [`traits::LlmClient`] interface and the Gemini
//! implementation used to comment on fetched pages. It also provides a
//! convenience function to initialize a client from a [`toolz_common::LlmConfig`].
//!
//! # Examples
//! ```no_run
//! use toolz_common::{LlmConfig, Result};
//! use toolz_llm::ensure_llm_ready;
//!
//! # fn main() -> Result<()> {
//! let cfg = LlmConfig::gemini("my-api-key", None);
//! let client = ensure_llm_ready(&cfg)?;
//! assert_eq!(client.model_name(), "gemini-1.5-flash-latest");
//! # Ok(())
//! # }
//! ```
pub mod gemini;
pub mod traits;

use gemini::{GeminiClient, GEMINI_BASE_URL};
use std::sync::Arc;
use toolz_common::{LlmConfig, ToolzError};
use traits::LlmClient;

/// Build the configured client, or fail when no provider is configured.
pub fn ensure_llm_ready(
    config: &LlmConfig,
) -> toolz_common::Result<Arc<dyn LlmClient + Send + Sync + 'static>> {
    match config {
        LlmConfig::Gemini {
            api_key,
            model,
            base_url,
        } => {
            if api_key.trim().is_empty() {
                return Err(ToolzError::Config("Gemini API key is empty".to_string()));
            }
            let base = base_url.as_deref().unwrap_or(GEMINI_BASE_URL);
            let client = GeminiClient::with_base_url(api_key.clone(), model.clone(), base)?;
            Ok(Arc::new(client))
        }
        LlmConfig::None => Err(ToolzError::Config("No LLM configured".to_string())),
    }
}
