//! Reply composer: category → canned reply, rendered as RFC 5322.

use std::sync::Arc;

use lettre::Message as MimeMessage;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use tracing::{info, warn};

use crate::error::{Error, ReplyError};
use crate::mail::MailProvider;
use crate::pipeline::types::{Category, Message, RawMessage};

const DEFAULT_SUBJECT: &str = "Re: Your Email";

/// Fixed reply body for each category.
pub fn reply_body(category: Category) -> &'static str {
    match category {
        Category::Interested => "Thank you for your interest! Are you available for a demo call?",
        Category::NotInterested => {
            "Thank you for your response. Let us know if you change your mind."
        }
        Category::MoreInformation => "Can you please specify what additional information you need?",
    }
}

/// `Re: <subject>`, without stacking prefixes.
pub fn reply_subject(original: Option<&str>) -> String {
    match original.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) if s.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("re:")) => s.to_string(),
        Some(s) => format!("Re: {s}"),
        None => DEFAULT_SUBJECT.to_string(),
    }
}

/// Builds and sends auto-replies.
pub struct ReplyComposer {
    mail: Arc<dyn MailProvider>,
    from: String,
}

impl ReplyComposer {
    pub fn new(mail: Arc<dyn MailProvider>, from: impl Into<String>) -> Self {
        Self {
            mail,
            from: from.into(),
        }
    }

    /// Minimal envelope for `category` addressed to `recipient`.
    pub fn compose(&self, category: Category, recipient: &str) -> RawMessage {
        RawMessage {
            from: self.from.clone(),
            to: recipient.trim().to_string(),
            subject: DEFAULT_SUBJECT.to_string(),
            body: reply_body(category).to_string(),
            in_reply_to: None,
            thread_id: None,
        }
    }

    /// Compose a reply threaded onto `original`.
    pub fn compose_reply(&self, category: Category, original: &Message) -> RawMessage {
        RawMessage {
            subject: reply_subject(original.subject.as_deref()),
            in_reply_to: original.rfc822_message_id.clone(),
            thread_id: original.thread_id.clone(),
            ..self.compose(category, &recipient(original))
        }
    }

    /// Submit through the mail transport. Returns the sent message id.
    pub async fn send(&self, message: &RawMessage) -> Result<String, Error> {
        let bytes = render(message)?;
        let sent_id = self
            .mail
            .send_raw(&bytes, message.thread_id.as_deref())
            .await?;
        info!(to = %message.to, sent_id = %sent_id, "Auto-reply sent");
        Ok(sent_id)
    }
}

/// Reply address for `original`: the full `From` mailbox when it parses,
/// otherwise the bare address.
fn recipient(original: &Message) -> String {
    match original.sender.parse::<Mailbox>() {
        Ok(mailbox) => mailbox.to_string(),
        Err(_) => {
            warn!(
                message_id = %original.id,
                sender = %original.sender,
                "Sender is not a valid mailbox, replying to bare address"
            );
            original.sender_address().to_string()
        }
    }
}

fn parse_mailbox(field: &'static str, value: &str) -> Result<Mailbox, ReplyError> {
    value.parse().map_err(|e| ReplyError::InvalidAddress {
        field,
        value: value.to_string(),
        reason: format!("{e}"),
    })
}

/// Render the envelope to RFC 5322 bytes.
pub fn render(message: &RawMessage) -> Result<Vec<u8>, ReplyError> {
    let mut builder = MimeMessage::builder()
        .from(parse_mailbox("from", &message.from)?)
        .to(parse_mailbox("to", &message.to)?)
        .subject(message.subject.as_str())
        .header(ContentType::TEXT_PLAIN);

    if let Some(ref id) = message.in_reply_to {
        builder = builder.in_reply_to(id.clone()).references(id.clone());
    }

    let mime = builder
        .body(message.body.clone())
        .map_err(|e| ReplyError::Build(e.to_string()))?;
    Ok(mime.formatted())
}
