//! Streaming chat client for prompt/chat backends.
//!
//! [`ChatClient`] POSTs a [`ChatRequest`] and hands the response body to the
//! [`StreamingResponseDecoder`], which resolves SSE frames, JSON lines or plain
//! text into ordered chunks. [`Conversation`] owns the message list on top of
//! any [`ChatBackend`] and persists it through a [`HistoryStore`].

pub mod cli;
pub mod client;
pub mod config;
pub mod conversation;
pub mod decoder;
pub mod error;
pub mod history;
pub mod prompts;
pub mod request;

pub use client::{ChatBackend, ChatClient};
pub use config::ClientConfig;
pub use conversation::{ChatMessage, Conversation, RequestOptions, SendOutcome};
pub use decoder::{
    classify_payload, ChannelSink, ChunkSink, DecodeSummary, DecodedRecord, ResponseBody,
    StreamingResponseDecoder,
};
pub use error::ChatError;
pub use history::HistoryStore;
pub use prompts::{PromptContent, PromptList};
pub use request::{ChatRequest, HistoryEntry, Role};
