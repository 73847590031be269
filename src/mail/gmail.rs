//! Gmail REST API client.
//!
//! Uses Gmail API v1:
//! - `users.messages.list` for the unread listing
//! - `users.messages.get?format=raw` for full content, parsed with `mail-parser`
//! - `users.labels.list` / `users.labels.create`
//! - `users.messages.modify` to add labels
//! - `users.messages.send` with a base64url `raw` payload

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use lettre::Address;
use lettre::message::Mailbox;
use mail_parser::MessageParser;
use reqwest::StatusCode;
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::MailError;
use crate::mail::{AccessTokenSource, MailProvider};
use crate::pipeline::types::{Label, LabelId, Message, MessageId, MessageRef};

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<GmailMessageRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessageRef {
    id: String,
    thread_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailRawMessage {
    id: String,
    thread_id: Option<String>,
    #[serde(default)]
    label_ids: Vec<String>,
    #[serde(default)]
    snippet: String,
    raw: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GmailLabel {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct LabelsListResponse {
    #[serde(default)]
    labels: Vec<GmailLabel>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLabelRequest<'a> {
    name: &'a str,
    label_list_visibility: &'static str,
    message_list_visibility: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModifyRequest {
    add_label_ids: Vec<String>,
    remove_label_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    raw: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Ignored {}

/// Gmail API client bound to the authenticated user (`users/me`).
pub struct GmailClient {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn AccessTokenSource>,
}

impl GmailClient {
    pub fn new(tokens: Arc<dyn AccessTokenSource>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: GMAIL_API_BASE.to_string(),
            tokens,
        }
    }

    /// Point the client at a different API root (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, MailError> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .get(format!("{}{}", self.base_url, endpoint))
            .bearer_auth(token.expose_secret())
            .query(query)
            .send()
            .await
            .map_err(|e| MailError::Connection(e.to_string()))?;
        handle_response(response).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, MailError> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .post(format!("{}{}", self.base_url, endpoint))
            .bearer_auth(token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| MailError::Connection(e.to_string()))?;
        handle_response(response).await
    }
}

async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, MailError> {
    let status = response.status();
    if !status.is_success() {
        return Err(error_for_status(response).await);
    }
    response
        .json()
        .await
        .map_err(|e| MailError::InvalidResponse(format!("parse response: {e}")))
}

async fn error_for_status(response: reqwest::Response) -> MailError {
    let status = response.status();
    let retry_after_secs = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => MailError::Authentication(body),
        StatusCode::NOT_FOUND => MailError::NotFound(body),
        StatusCode::CONFLICT => MailError::Conflict(body),
        StatusCode::TOO_MANY_REQUESTS => MailError::RateLimited { retry_after_secs },
        _ => MailError::Api {
            status: status.as_u16(),
            body,
        },
    }
}

/// Decode Gmail's base64url payload; padding is optional on input.
fn decode_base64url(data: &str) -> Result<Vec<u8>, MailError> {
    URL_SAFE_NO_PAD
        .decode(data.trim().trim_end_matches('='))
        .map_err(|e| MailError::Encoding(format!("base64url decode: {e}")))
}

pub fn encode_base64url(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Strip HTML tags and collapse whitespace.
fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Build a [`Message`] from a `format=raw` response.
fn parse_raw_message(msg: GmailRawMessage) -> Result<Message, MailError> {
    let raw = msg
        .raw
        .as_deref()
        .ok_or_else(|| MailError::InvalidResponse(format!("message {} has no raw body", msg.id)))?;
    let bytes = decode_base64url(raw)?;
    parse_rfc822(msg.id, msg.thread_id, &msg.label_ids, msg.snippet, &bytes)
}

/// Render a `From` mailbox as a header value, quoting the display name
/// when it holds specials such as `,`.
fn format_sender(name: Option<&str>, address: &str) -> String {
    match address.parse::<Address>() {
        Ok(email) => Mailbox::new(name.map(str::to_string), email).to_string(),
        Err(_) => address.to_string(),
    }
}

/// Build a [`Message`] from RFC 5322 bytes plus the provider metadata.
pub(crate) fn parse_rfc822(
    id: String,
    thread_id: Option<String>,
    label_ids: &[String],
    snippet: String,
    bytes: &[u8],
) -> Result<Message, MailError> {
    let parsed = MessageParser::default()
        .parse(bytes)
        .ok_or_else(|| MailError::InvalidResponse(format!("message {id} is not RFC 5322")))?;

    let sender = parsed
        .from()
        .and_then(|addr| addr.first())
        .map(|a| match (a.name(), a.address()) {
            (name, Some(address)) => format_sender(name, address),
            (Some(name), None) => name.to_string(),
            (None, None) => String::new(),
        })
        .filter(|s| !s.is_empty())
        .ok_or_else(|| MailError::InvalidResponse(format!("message {id} has no sender")))?;

    let body = if let Some(text) = parsed.body_text(0) {
        text.trim().to_string()
    } else if let Some(html) = parsed.body_html(0) {
        strip_html(html.as_ref())
    } else {
        String::new()
    };

    let auto_submitted = parsed
        .headers()
        .iter()
        .find(|h| h.name().eq_ignore_ascii_case("Auto-Submitted"))
        .and_then(|h| h.value().as_text())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.eq_ignore_ascii_case("no"));

    Ok(Message {
        id: MessageId::new(id),
        thread_id,
        sender,
        subject: parsed.subject().map(str::to_string),
        rfc822_message_id: parsed.message_id().map(|mid| format!("<{mid}>")),
        snippet,
        body,
        unread: label_ids.iter().any(|l| l == "UNREAD"),
        auto_submitted,
    })
}

#[async_trait]
impl MailProvider for GmailClient {
    async fn list_messages(
        &self,
        query: &str,
        page_size: u32,
    ) -> Result<Vec<MessageRef>, MailError> {
        let response: MessageListResponse = self
            .get(
                "/messages",
                &[
                    ("q", query.to_string()),
                    ("maxResults", page_size.to_string()),
                ],
            )
            .await?;
        debug!(count = response.messages.len(), query, "Listed messages");
        Ok(response
            .messages
            .into_iter()
            .map(|m| MessageRef {
                id: MessageId::new(m.id),
                thread_id: m.thread_id,
            })
            .collect())
    }

    async fn get_message(&self, id: &MessageId) -> Result<Message, MailError> {
        let msg: GmailRawMessage = self
            .get(
                &format!("/messages/{}", id.as_str()),
                &[("format", "raw".to_string())],
            )
            .await?;
        parse_raw_message(msg)
    }

    async fn list_labels(&self) -> Result<Vec<Label>, MailError> {
        let response: LabelsListResponse = self.get("/labels", &[]).await?;
        Ok(response
            .labels
            .into_iter()
            .map(|l| Label {
                id: LabelId(l.id),
                name: l.name,
            })
            .collect())
    }

    async fn create_label(&self, name: &str) -> Result<Label, MailError> {
        let label: GmailLabel = self
            .post(
                "/labels",
                &CreateLabelRequest {
                    name,
                    label_list_visibility: "labelShow",
                    message_list_visibility: "show",
                },
            )
            .await?;
        info!(label_id = %label.id, name = %label.name, "Created label");
        Ok(Label {
            id: LabelId(label.id),
            name: label.name,
        })
    }

    async fn add_labels(&self, id: &MessageId, labels: &[LabelId]) -> Result<(), MailError> {
        let _: Ignored = self
            .post(
                &format!("/messages/{}/modify", id.as_str()),
                &ModifyRequest {
                    add_label_ids: labels.iter().map(|l| l.0.clone()).collect(),
                    remove_label_ids: Vec::new(),
                },
            )
            .await?;
        Ok(())
    }

    async fn send_raw(
        &self,
        rfc822: &[u8],
        thread_id: Option<&str>,
    ) -> Result<String, MailError> {
        let response: SendResponse = self
            .post(
                "/messages/send",
                &SendRequest {
                    raw: encode_base64url(rfc822),
                    thread_id,
                },
            )
            .await?;
        info!(sent_id = %response.id, "Reply sent via Gmail API");
        Ok(response.id)
    }
}
