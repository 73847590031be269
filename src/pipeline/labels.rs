//! Labeling service: category → remote label, created on first use.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::MailError;
use crate::mail::MailProvider;
use crate::pipeline::types::{Category, LabelId, MessageId};

/// Resolves and applies mailbox labels.
///
/// Resolved ids are cached for the process lifetime. The cache is only a
/// shortcut: a miss always re-resolves against the remote namespace before
/// creating, so labels created by an earlier run are reused.
pub struct LabelService {
    mail: Arc<dyn MailProvider>,
    registry: RwLock<HashMap<String, LabelId>>,
}

impl LabelService {
    pub fn new(mail: Arc<dyn MailProvider>) -> Self {
        Self {
            mail,
            registry: RwLock::new(HashMap::new()),
        }
    }

    /// Return the id of the label called `name`, creating it if absent.
    pub async fn ensure_label(&self, name: &str) -> Result<LabelId, MailError> {
        if let Some(id) = self.registry.read().await.get(name) {
            return Ok(id.clone());
        }

        let mut registry = self.registry.write().await;
        if let Some(id) = registry.get(name) {
            return Ok(id.clone());
        }

        let id = match self.find_remote(name).await? {
            Some(id) => {
                debug!(name, label_id = %id, "Label already exists");
                id
            }
            None => match self.mail.create_label(name).await {
                Ok(label) => {
                    info!(name, label_id = %label.id, "Label created");
                    label.id
                }
                Err(MailError::Conflict(reason)) => {
                    warn!(name, %reason, "Label created concurrently, re-resolving");
                    self.find_remote(name).await?.ok_or_else(|| {
                        MailError::InvalidResponse(format!(
                            "label '{name}' conflicted on create but is not listed"
                        ))
                    })?
                }
                Err(e) => return Err(e),
            },
        };

        registry.insert(name.to_string(), id.clone());
        Ok(id)
    }

    /// Label `message_id` with the label for `category`.
    pub async fn apply_label(
        &self,
        message_id: &MessageId,
        category: Category,
    ) -> Result<LabelId, MailError> {
        let label_id = self.ensure_label(category.label_name()).await?;
        self.mail
            .add_labels(message_id, std::slice::from_ref(&label_id))
            .await?;
        info!(message_id = %message_id, label_id = %label_id, category = %category, "Label applied");
        Ok(label_id)
    }

    async fn find_remote(&self, name: &str) -> Result<Option<LabelId>, MailError> {
        Ok(self
            .mail
            .list_labels()
            .await?
            .into_iter()
            .find(|l| l.name == name)
            .map(|l| l.id))
    }
}
