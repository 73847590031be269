//! Core data model for the poll cycle.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Provider-assigned message identifier.
///
/// Ordering is lexical on the raw string. That is the only ordering the
/// checkpoint comparison relies on; it matches arrival order only as far as
/// the provider's identifier scheme does.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when this message sorts strictly after the checkpoint.
    /// No checkpoint means everything is new.
    pub fn is_after(&self, checkpoint: Option<&Checkpoint>) -> bool {
        match checkpoint {
            Some(cp) => self > cp.message_id(),
            None => true,
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of the last fully processed message.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Checkpoint(MessageId);

impl Checkpoint {
    pub fn new(message_id: MessageId) -> Self {
        Self(message_id)
    }

    /// Parse a stored value. Blank input is the valid "nothing processed" state.
    pub fn from_stored(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(MessageId::new(trimmed)))
        }
    }

    pub fn message_id(&self) -> &MessageId {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Entry in an unread listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub id: MessageId,
    pub thread_id: Option<String>,
}

/// A fully fetched message. Immutable once fetched.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: MessageId,
    pub thread_id: Option<String>,
    /// `From` mailbox, e.g. `Alice <alice@example.com>`. Display names
    /// holding specials arrive quoted: `"Doe, Jane" <jane@example.com>`.
    pub sender: String,
    pub subject: Option<String>,
    /// RFC 5322 `Message-ID` of the original, used for threading the reply.
    pub rfc822_message_id: Option<String>,
    pub snippet: String,
    pub body: String,
    pub unread: bool,
    /// `Auto-Submitted` header value when present and not `no`.
    pub auto_submitted: Option<String>,
}

impl Message {
    /// Text handed to the classifier: the snippet, or the body when the
    /// provider returned no snippet.
    pub fn classification_text(&self) -> &str {
        if self.snippet.trim().is_empty() {
            self.body.trim()
        } else {
            self.snippet.trim()
        }
    }

    /// Bare address from the `From` header.
    pub fn sender_address(&self) -> &str {
        extract_address(&self.sender)
    }
}

/// Pull `addr` out of `Name <addr>`; returns the trimmed input otherwise.
pub fn extract_address(header: &str) -> &str {
    let trimmed = header.trim();
    match (trimmed.rfind('<'), trimmed.rfind('>')) {
        (Some(start), Some(end)) if start < end => trimmed[start + 1..end].trim(),
        _ => trimmed,
    }
}

/// Closed classification outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Interested,
    NotInterested,
    MoreInformation,
}

impl Category {
    pub const ALL: [Category; 3] = [
        Category::Interested,
        Category::NotInterested,
        Category::MoreInformation,
    ];

    /// Mailbox label name for this category.
    pub fn label_name(&self) -> &'static str {
        match self {
            Category::Interested => "Interested",
            Category::NotInterested => "Not Interested",
            Category::MoreInformation => "More information",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label_name())
    }
}

/// Remote label identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LabelId(pub String);

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A remote mailbox label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub id: LabelId,
    pub name: String,
}

/// Outgoing message envelope. Transport encoding is left to the mail provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub in_reply_to: Option<String>,
    pub thread_id: Option<String>,
}

/// What a completed tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing newer than the checkpoint.
    Idle,
    /// Labeled, replied to, and checkpointed.
    Processed {
        message_id: MessageId,
        category: Category,
    },
    /// Checkpointed without labeling or replying.
    Skipped { message_id: MessageId, reason: String },
}

impl TickOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TickOutcome::Idle => "idle",
            TickOutcome::Processed { .. } => "processed",
            TickOutcome::Skipped { .. } => "skipped",
        }
    }
}
