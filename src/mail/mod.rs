//! Mail provider seam.
//!
//! The poll cycle consumes a remote, fallible, rate-limited mailbox through
//! [`MailProvider`]. [`gmail::GmailClient`] implements it over the Gmail REST
//! API; the access token comes from an [`auth::AccessTokenSource`].

pub mod auth;
pub mod gmail;

pub use auth::{AccessTokenSource, RefreshTokenSource, StaticTokenSource};
pub use gmail::GmailClient;

use async_trait::async_trait;

use crate::error::MailError;
use crate::pipeline::types::{Label, LabelId, Message, MessageId, MessageRef};

/// Operations the poll cycle needs from the mailbox.
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// List messages matching `query` (e.g. `is:unread`), at most `page_size`.
    /// Provider order is not guaranteed.
    async fn list_messages(
        &self,
        query: &str,
        page_size: u32,
    ) -> Result<Vec<MessageRef>, MailError>;

    async fn get_message(&self, id: &MessageId) -> Result<Message, MailError>;

    async fn list_labels(&self) -> Result<Vec<Label>, MailError>;

    /// Create a user label. Fails with [`MailError::Conflict`] if it exists.
    async fn create_label(&self, name: &str) -> Result<Label, MailError>;

    async fn add_labels(&self, id: &MessageId, labels: &[LabelId]) -> Result<(), MailError>;

    /// Send an RFC 5322 message. Returns the provider id of the sent message.
    async fn send_raw(&self, rfc822: &[u8], thread_id: Option<&str>)
    -> Result<String, MailError>;
}
