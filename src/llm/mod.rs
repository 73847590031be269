//! Generative-language backend.
//!
//! The classifier only needs text-in, text-out completion, expressed by the
//! [`LlmProvider`] trait. [`GeminiProvider`] talks to the Gemini REST API.

pub mod gemini;
pub mod provider;

pub use gemini::GeminiProvider;
pub use provider::*;

use std::sync::Arc;
use std::time::Duration;

use crate::error::LlmError;

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: secrecy::SecretString,
    pub model: String,
    pub timeout: Duration,
    /// Override for the API root; `None` uses the public endpoint.
    pub base_url: Option<String>,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let mut provider = GeminiProvider::new(config.api_key.clone(), &config.model, config.timeout)?;
    if let Some(ref base) = config.base_url {
        provider = provider.with_base_url(base);
    }
    tracing::info!("Using Gemini (model: {})", config.model);
    Ok(Arc::new(provider))
}
