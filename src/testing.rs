//! In-crate fakes shared by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::{LlmError, MailError, StoreError};
use crate::llm::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role};
use crate::mail::MailProvider;
use crate::mail::gmail::parse_rfc822;
use crate::pipeline::types::{Checkpoint, Label, LabelId, Message, MessageId, MessageRef};
use crate::store::traits::{CheckpointStore, check_monotonic};

// ── Mailbox ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct MailboxState {
    /// Messages in listing order.
    messages: Vec<Message>,
    labels: Vec<Label>,
    applied: HashMap<String, Vec<LabelId>>,
    sent: Vec<String>,
    fetched: Vec<String>,
    create_label_calls: usize,
    racing: HashSet<String>,
    next_label: usize,
    fail_list: bool,
    fail_get: bool,
    fail_modify: bool,
    fail_send: bool,
}

impl MailboxState {
    fn insert_label(&mut self, name: &str) -> LabelId {
        self.next_label += 1;
        let id = LabelId(format!("Label_{}", self.next_label));
        self.labels.push(Label {
            id: id.clone(),
            name: name.to_string(),
        });
        id
    }
}

/// Mailbox fake with one-shot failure switches.
#[derive(Default)]
pub struct InMemoryMailbox {
    state: Mutex<MailboxState>,
}

impl InMemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MailboxState> {
        self.state.lock().unwrap()
    }

    pub fn add_message(&self, message: Message) {
        self.state().messages.push(message);
    }

    pub fn add_unread(&self, id: &str, sender: &str, snippet: &str) {
        self.add_message(Message {
            id: MessageId::new(id),
            thread_id: Some(format!("thread-{id}")),
            sender: sender.to_string(),
            subject: None,
            rfc822_message_id: Some(format!("<{id}@mail.example.com>")),
            snippet: snippet.to_string(),
            body: snippet.to_string(),
            unread: true,
            auto_submitted: None,
        });
    }

    /// Add an unread message built from RFC 5322 text, parsed the way the
    /// Gmail client parses `format=raw` responses.
    pub fn add_rfc822(&self, id: &str, rfc822: &str) {
        let message = parse_rfc822(
            id.to_string(),
            Some(format!("thread-{id}")),
            &["UNREAD".to_string()],
            String::new(),
            rfc822.as_bytes(),
        )
        .unwrap();
        self.add_message(message);
    }

    pub fn seed_label(&self, name: &str) -> LabelId {
        self.state().insert_label(name)
    }

    /// The next create of `name` loses a race: another client creates it
    /// first and the call answers 409.
    pub fn race_label_creation(&self, name: &str) {
        self.state().racing.insert(name.to_string());
    }

    pub fn label_id(&self, name: &str) -> Option<LabelId> {
        self.state()
            .labels
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.id.clone())
    }

    pub fn labels_on(&self, id: &str) -> Vec<LabelId> {
        self.state().applied.get(id).cloned().unwrap_or_default()
    }

    pub fn labeled_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state().applied.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn create_label_calls(&self) -> usize {
        self.state().create_label_calls
    }

    pub fn sent(&self) -> Vec<String> {
        self.state().sent.clone()
    }

    pub fn fetched(&self) -> Vec<String> {
        self.state().fetched.clone()
    }

    pub fn fail_next_list(&self) {
        self.state().fail_list = true;
    }

    pub fn fail_next_get(&self) {
        self.state().fail_get = true;
    }

    pub fn fail_next_modify(&self) {
        self.state().fail_modify = true;
    }

    pub fn fail_next_send(&self) {
        self.state().fail_send = true;
    }
}

fn injected(op: &str) -> MailError {
    MailError::Api {
        status: 500,
        body: format!("injected {op} failure"),
    }
}

#[async_trait]
impl MailProvider for InMemoryMailbox {
    async fn list_messages(
        &self,
        _query: &str,
        page_size: u32,
    ) -> Result<Vec<MessageRef>, MailError> {
        let mut state = self.state();
        if std::mem::take(&mut state.fail_list) {
            return Err(injected("list"));
        }
        Ok(state
            .messages
            .iter()
            .filter(|m| m.unread)
            .take(page_size as usize)
            .map(|m| MessageRef {
                id: m.id.clone(),
                thread_id: m.thread_id.clone(),
            })
            .collect())
    }

    async fn get_message(&self, id: &MessageId) -> Result<Message, MailError> {
        let mut state = self.state();
        if std::mem::take(&mut state.fail_get) {
            return Err(injected("get"));
        }
        state.fetched.push(id.to_string());
        state
            .messages
            .iter()
            .find(|m| &m.id == id)
            .cloned()
            .ok_or_else(|| MailError::NotFound(format!("message {id}")))
    }

    async fn list_labels(&self) -> Result<Vec<Label>, MailError> {
        Ok(self.state().labels.clone())
    }

    async fn create_label(&self, name: &str) -> Result<Label, MailError> {
        let mut state = self.state();
        state.create_label_calls += 1;
        if state.racing.remove(name) {
            state.insert_label(name);
            return Err(MailError::Conflict(format!("label '{name}' exists")));
        }
        if state.labels.iter().any(|l| l.name == name) {
            return Err(MailError::Conflict(format!("label '{name}' exists")));
        }
        let id = state.insert_label(name);
        Ok(Label {
            id,
            name: name.to_string(),
        })
    }

    async fn add_labels(&self, id: &MessageId, labels: &[LabelId]) -> Result<(), MailError> {
        let mut state = self.state();
        if std::mem::take(&mut state.fail_modify) {
            return Err(injected("modify"));
        }
        state
            .applied
            .entry(id.to_string())
            .or_default()
            .extend(labels.iter().cloned());
        Ok(())
    }

    async fn send_raw(
        &self,
        rfc822: &[u8],
        _thread_id: Option<&str>,
    ) -> Result<String, MailError> {
        let mut state = self.state();
        if std::mem::take(&mut state.fail_send) {
            return Err(injected("send"));
        }
        state.sent.push(String::from_utf8_lossy(rfc822).into_owned());
        Ok(format!("sent-{}", state.sent.len()))
    }
}

// ── LLM ─────────────────────────────────────────────────────────────────

/// Replies with a fixed text, or fails every call.
pub struct ScriptedLlm {
    reply: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Some(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// User-turn text of every request seen so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let prompt = request
            .messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        self.prompts.lock().unwrap().push(prompt);

        match &self.reply {
            Some(text) => Ok(CompletionResponse {
                content: text.clone(),
                input_tokens: 0,
                output_tokens: 0,
                finish_reason: FinishReason::Stop,
            }),
            None => Err(LlmError::RequestFailed {
                provider: "scripted".to_string(),
                reason: "backend unavailable".to_string(),
            }),
        }
    }
}

// ── Checkpoint store ────────────────────────────────────────────────────

/// Volatile store whose saves can be switched to fail.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    value: Mutex<Option<Checkpoint>>,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(id: &str) -> Self {
        let store = Self::default();
        *store.value.lock().unwrap() = Checkpoint::from_stored(id);
        store
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn save_calls(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> Option<Checkpoint> {
        self.value.lock().unwrap().clone()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self) -> Result<Option<Checkpoint>, StoreError> {
        Ok(self.current())
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        let mut value = self.value.lock().unwrap();
        check_monotonic(value.as_ref(), checkpoint)?;
        *value = Some(checkpoint.clone());
        Ok(())
    }
}
