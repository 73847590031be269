//! Poll cycle orchestrator.
//!
//! One tick: load checkpoint → list unread → pick the first message after
//! the checkpoint → fetch → classify → label → reply → save checkpoint.
//! At most one message is handled per tick. Any failure ends the tick with
//! a [`TickError`] before the checkpoint is written, so the same message is
//! picked up again next tick.

use std::sync::Arc;

use tracing::{Instrument, debug, info, info_span};
use uuid::Uuid;

use crate::error::{TickError, TickStage};
use crate::mail::MailProvider;
use crate::pipeline::classifier::MessageClassifier;
use crate::pipeline::labels::LabelService;
use crate::pipeline::reply::ReplyComposer;
use crate::pipeline::types::{Checkpoint, Message, MessageId, MessageRef, TickOutcome};
use crate::store::CheckpointStore;

/// Everything a tick talks to. Built once per process and injected.
pub struct PollerDeps {
    pub mail: Arc<dyn MailProvider>,
    pub classifier: Arc<MessageClassifier>,
    pub labels: Arc<LabelService>,
    pub replies: Arc<ReplyComposer>,
    pub checkpoints: Arc<dyn CheckpointStore>,
}

/// Tunables for the unread listing and the sender skip list.
#[derive(Debug, Clone)]
pub struct CycleConfig {
    pub query: String,
    pub page_size: u32,
    /// Exact addresses, `@domain`, or bare `domain` entries.
    pub ignore_senders: Vec<String>,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            query: "is:unread".to_string(),
            page_size: 10,
            ignore_senders: Vec::new(),
        }
    }
}

pub struct PollCycle {
    deps: PollerDeps,
    config: CycleConfig,
}

impl PollCycle {
    pub fn new(deps: PollerDeps, config: CycleConfig) -> Self {
        Self { deps, config }
    }

    /// Run one tick inside its own span.
    pub async fn run_tick(&self) -> Result<TickOutcome, TickError> {
        let tick_id = Uuid::new_v4();
        self.tick()
            .instrument(info_span!("tick", %tick_id))
            .await
    }

    async fn tick(&self) -> Result<TickOutcome, TickError> {
        let checkpoint = self
            .deps
            .checkpoints
            .load()
            .await
            .map_err(|e| TickError::new(TickStage::Loading, e))?;

        let page = self
            .deps
            .mail
            .list_messages(&self.config.query, self.config.page_size)
            .await
            .map_err(|e| TickError::new(TickStage::Listing, e))?;

        let Some(candidate) = select_candidate(&page, checkpoint.as_ref()) else {
            debug!(
                listed = page.len(),
                checkpoint = checkpoint.as_ref().map(Checkpoint::as_str).unwrap_or(""),
                "No message after checkpoint"
            );
            return Ok(TickOutcome::Idle);
        };
        let message_id = candidate.id.clone();

        let message = self
            .deps
            .mail
            .get_message(&message_id)
            .await
            .map_err(|e| TickError::new(TickStage::Fetching, e))?;

        if let Some(reason) = self.skip_reason(&message) {
            self.advance(&message_id).await?;
            info!(message_id = %message_id, %reason, "Message skipped");
            return Ok(TickOutcome::Skipped { message_id, reason });
        }

        let category = self
            .deps
            .classifier
            .classify(message.classification_text())
            .await
            .map_err(|e| TickError::new(TickStage::Classifying, e))?;

        self.deps
            .labels
            .apply_label(&message_id, category)
            .await
            .map_err(|e| TickError::new(TickStage::Labeling, e))?;

        let reply = self.deps.replies.compose_reply(category, &message);
        self.deps
            .replies
            .send(&reply)
            .await
            .map_err(|e| TickError::new(TickStage::Replying, e))?;

        self.advance(&message_id).await?;
        info!(message_id = %message_id, category = %category, "Message processed");
        Ok(TickOutcome::Processed {
            message_id,
            category,
        })
    }

    async fn advance(&self, message_id: &MessageId) -> Result<(), TickError> {
        self.deps
            .checkpoints
            .save(&Checkpoint::new(message_id.clone()))
            .await
            .map_err(|e| TickError::new(TickStage::Checkpointing, e))
    }

    fn skip_reason(&self, message: &Message) -> Option<String> {
        if let Some(ref value) = message.auto_submitted {
            return Some(format!("auto-submitted ({value})"));
        }
        let address = message.sender_address();
        if sender_matches(&self.config.ignore_senders, address) {
            return Some(format!("ignored sender {address}"));
        }
        None
    }
}

/// First entry of the page, in provider order, that sorts after the checkpoint.
pub fn select_candidate<'a>(
    page: &'a [MessageRef],
    checkpoint: Option<&Checkpoint>,
) -> Option<&'a MessageRef> {
    page.iter().find(|m| m.id.is_after(checkpoint))
}

/// Whether `email` is covered by any entry of `patterns`.
pub fn sender_matches(patterns: &[String], email: &str) -> bool {
    let email_lower = email.to_lowercase();
    patterns.iter().any(|p| {
        let p = p.trim().to_lowercase();
        if p.is_empty() {
            false
        } else if p.starts_with('@') {
            email_lower.ends_with(&p)
        } else if p.contains('@') {
            email_lower == p
        } else {
            email_lower.ends_with(&format!("@{p}"))
        }
    })
}
