//! Common types and utilities shared across Toolz crates.
//!
//! This crate defines the provider configuration, observability helpers, and
//! shared error types used throughout the Toolz workspace. It stays
//! dependency‑minimal so that every crate can depend on it cheaply.
//!
//! # Overview
//!
//! - [`LlmConfig`]: Provider‑agnostic LLM configuration
//! - [`observability`]: Centralised tracing/logging initialisation
//! - [`ToolzError`] and [`Result`]: Shared error handling
//!
//! # Examples
//!
//! ```rust
//! use toolz_common::LlmConfig;
//!
//! let cfg = LlmConfig::gemini("secret", None);
//! assert_eq!(cfg.model(), Some("gemini-1.5-flash-latest"));
//! assert!(LlmConfig::default().model().is_none());
//! ```
use serde::{Deserialize, Serialize};

pub mod observability;

/// Model used when the caller does not pick one.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash-latest";

/// Configuration for the text-generation provider that comments on fetched pages.
///
/// See the `toolz-llm` crate for the concrete client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum LlmConfig {
    Gemini {
        api_key: String,
        model: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        base_url: Option<String>,
    },
    #[default]
    None,
}

impl LlmConfig {
    /// Gemini with the default model unless one is given.
    pub fn gemini(api_key: impl Into<String>, model: Option<String>) -> Self {
        Self::Gemini {
            api_key: api_key.into(),
            model: model.unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            base_url: None,
        }
    }

    pub fn model(&self) -> Option<&str> {
        match self {
            Self::Gemini { model, .. } => Some(model),
            Self::None => None,
        }
    }
}

/// Error types used across the Toolz system.
#[derive(thiserror::Error, Debug)]
pub enum ToolzError {
    /// The text-generation provider rejected or failed a request.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Configuration was incomplete or invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenient alias for results that use [`ToolzError`].
pub type Result<T> = std::result::Result<T, ToolzError>;
