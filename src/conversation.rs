//! Conversation state owner.
//!
//! Holds the visible message list, builds the request for each send, streams
//! the reply into an assistant message and persists the result. Sends are
//! serialized by `&mut self`: one request is in flight per conversation.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::client::ChatBackend;
use crate::decoder::DecodeSummary;
use crate::error::ChatError;
use crate::history::HistoryStore;
use crate::request::{ChatRequest, HistoryEntry, Role};

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub text: String,
    pub sender: Role,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
}

impl ChatMessage {
    pub fn new(sender: Role, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            sender,
            timestamp_ms: now_ms(),
        }
    }
}

/// Per-conversation request settings copied into every [`ChatRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub model: Option<String>,
    pub model_version: Option<String>,
    pub prompt: Option<String>,
    pub title: Option<String>,
}

impl RequestOptions {
    fn build(&self, message: &str, history: Vec<HistoryEntry>) -> ChatRequest {
        ChatRequest {
            message: message.to_string(),
            history,
            model: self.model.clone(),
            model_version: self.model_version.clone(),
            prompt: self.prompt.clone(),
            input_title: self.title.clone(),
        }
    }
}

#[derive(Debug)]
pub enum SendOutcome {
    /// Input was blank; nothing was sent or recorded.
    Empty,
    Completed(DecodeSummary),
    /// The error was also appended to the conversation as an assistant message.
    Failed(ChatError),
}

impl SendOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SendOutcome::Completed(_))
    }
}

pub struct Conversation<B> {
    backend: B,
    api_path: String,
    messages: Vec<ChatMessage>,
    options: RequestOptions,
    store: Option<HistoryStore>,
}

impl<B: ChatBackend> Conversation<B> {
    /// `api_path` identifies the conversation for persistence.
    pub fn new(backend: B, api_path: impl Into<String>) -> Self {
        Self {
            backend,
            api_path: api_path.into(),
            messages: Vec::new(),
            options: RequestOptions::default(),
            store: None,
        }
    }

    pub fn with_store(mut self, store: HistoryStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options_mut(&mut self) -> &mut RequestOptions {
        &mut self.options
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn api_path(&self) -> &str {
        &self.api_path
    }

    /// Replace the in-memory messages with the persisted ones.
    pub fn load_history(&mut self) {
        if let Some(store) = &self.store {
            self.messages = store.load(&self.api_path);
        }
    }

    pub fn clear(&mut self) -> Result<(), ChatError> {
        self.messages.clear();
        match &self.store {
            Some(store) => store.clear(&self.api_path),
            None => Ok(()),
        }
    }

    pub async fn send(&mut self, input: &str) -> SendOutcome {
        self.send_with(input, |_| {}).await
    }

    /// Send `input`, also passing every chunk to `on_chunk` as it arrives.
    pub async fn send_with<F: FnMut(&str)>(&mut self, input: &str, mut on_chunk: F) -> SendOutcome {
        let message = input.trim();
        if message.is_empty() {
            return SendOutcome::Empty;
        }

        // Everything before this exchange.
        let history: Vec<HistoryEntry> = self
            .messages
            .iter()
            .map(|m| HistoryEntry::new(m.sender, m.text.clone()))
            .collect();

        self.messages.push(ChatMessage::new(Role::User, message));
        self.persist();

        let reply = self.messages.len();
        self.messages.push(ChatMessage::new(Role::Assistant, ""));

        let request = self.options.build(message, history);
        let Self { backend, messages, .. } = &mut *self;
        let mut sink = |chunk: &str| {
            messages[reply].text.push_str(chunk);
            on_chunk(chunk);
        };
        let result = backend.send_chat(&request, &mut sink).await;

        match result {
            Ok(summary) => {
                self.persist();
                SendOutcome::Completed(summary)
            }
            Err(e) => {
                warn!(error = %e, transport = e.is_transport(), "chat send failed");
                self.messages
                    .push(ChatMessage::new(Role::Assistant, format!("Error: {e}")));
                self.persist();
                SendOutcome::Failed(e)
            }
        }
    }

    fn persist(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&self.api_path, &self.messages) {
                warn!(error = %e, api_path = %self.api_path, "failed to save chat history");
            }
        }
    }
}
