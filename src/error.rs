//! Error types for the auto-reply poller.

use std::fmt;
use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Checkpoint store error: {0}")]
    Store(#[from] StoreError),

    #[error("Mail provider error: {0}")]
    Mail(#[from] MailError),

    #[error("Classification error: {0}")]
    Classify(#[from] ClassifyError),

    #[error("Reply error: {0}")]
    Reply(#[from] ReplyError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Checkpoint persistence failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to open store: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint would move backwards from {current} to {attempted}")]
    Regression { current: String, attempted: String },
}

/// Mail provider (Gmail API) failures.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited, retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Encoding failed: {0}")]
    Encoding(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The generative backend could not produce a classification.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("Classifier backend failed: {0}")]
    Backend(#[from] LlmError),

    #[error("Classifier backend returned an empty response")]
    EmptyResponse,
}

/// Reply composition failures.
#[derive(Debug, thiserror::Error)]
pub enum ReplyError {
    #[error("Invalid {field} address '{value}': {reason}")]
    InvalidAddress {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Failed to build reply: {0}")]
    Build(String),
}

/// Where in the poll cycle a tick failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStage {
    Loading,
    Listing,
    Fetching,
    Classifying,
    Labeling,
    Replying,
    Checkpointing,
}

impl TickStage {
    pub fn label(&self) -> &'static str {
        match self {
            TickStage::Loading => "loading checkpoint",
            TickStage::Listing => "listing unread",
            TickStage::Fetching => "fetching message",
            TickStage::Classifying => "classifying",
            TickStage::Labeling => "labeling",
            TickStage::Replying => "replying",
            TickStage::Checkpointing => "saving checkpoint",
        }
    }
}

impl fmt::Display for TickStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A tick aborted before advancing the checkpoint.
#[derive(Debug, thiserror::Error)]
#[error("Tick failed while {stage}: {source}")]
pub struct TickError {
    pub stage: TickStage,
    #[source]
    pub source: Error,
}

impl TickError {
    pub fn new(stage: TickStage, source: impl Into<Error>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_failure_reaches_tick_as_classify_error() {
        let backend = LlmError::RequestFailed {
            provider: "gemini".into(),
            reason: "connection reset".into(),
        };
        let err = TickError::new(TickStage::Classifying, ClassifyError::from(backend));

        assert!(matches!(
            err.source,
            Error::Classify(ClassifyError::Backend(LlmError::RequestFailed { .. }))
        ));
        assert_eq!(
            err.to_string(),
            "Tick failed while classifying: Classification error: \
             Classifier backend failed: Provider gemini request failed: connection reset"
        );
    }

    #[test]
    fn store_failure_keeps_stage() {
        let err = TickError::new(
            TickStage::Checkpointing,
            StoreError::Query("disk full".into()),
        );
        assert_eq!(err.stage, TickStage::Checkpointing);
        assert!(matches!(err.source, Error::Store(StoreError::Query(_))));
    }
}
