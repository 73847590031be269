//! Message classifier: one generative call, then substring matching.
//!
//! The model is asked for one of three phrases, but its answer is still
//! free text. `categorize` checks the negative cue before the positive one
//! because "not interested" contains "interested".

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::ClassifyError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::types::Category;

const CLASSIFY_TEMPERATURE: f32 = 0.9;
const CLASSIFY_TOP_P: f32 = 1.0;
const CLASSIFY_TOP_K: u32 = 1;
const CLASSIFY_MAX_TOKENS: u32 = 4096;

const NEGATIVE_CUE: &str = "not interested";
const POSITIVE_CUE: &str = "interested";

const CLASSIFY_SYSTEM_PROMPT: &str = "You read replies to a sales outreach email. \
Answer with exactly one of: \"interested\", \"not interested\", or \"more information\".";

/// Map free-text model output to a category.
///
/// Matching is case-insensitive. Anything without either cue falls back to
/// [`Category::MoreInformation`].
pub fn categorize(response: &str) -> Category {
    let lower = response.to_lowercase();
    if lower.contains(NEGATIVE_CUE) {
        Category::NotInterested
    } else if lower.contains(POSITIVE_CUE) {
        Category::Interested
    } else {
        Category::MoreInformation
    }
}

/// Classifies message text via an [`LlmProvider`].
pub struct MessageClassifier {
    llm: Arc<dyn LlmProvider>,
}

impl MessageClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    pub async fn classify(&self, text: &str) -> Result<Category, ClassifyError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(CLASSIFY_SYSTEM_PROMPT),
            ChatMessage::user(text),
        ])
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_top_p(CLASSIFY_TOP_P)
        .with_top_k(CLASSIFY_TOP_K)
        .with_max_tokens(CLASSIFY_MAX_TOKENS);

        let response = self.llm.complete(request).await?;
        if response.content.trim().is_empty() {
            return Err(ClassifyError::EmptyResponse);
        }

        debug!(model = self.llm.model_name(), raw = %response.content, "Classifier response");
        let category = categorize(&response.content);
        info!(category = %category, "Message classified");
        Ok(category)
    }
}
