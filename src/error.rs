//! Crate-level error type.
//!
//! Only [`ChatError::Rejected`] originates inside the stream decoder. The
//! transport variants (`Connect`, `Http`) are raised by the client before any
//! decoding starts, so callers can tell the two apart.

use thiserror::Error;

/// Default text used when a rejecting handshake carries no `result_msg`.
pub const DEFAULT_REJECTION_MESSAGE: &str = "request rejected by server";

#[derive(Debug, Error)]
pub enum ChatError {
    /// The request could not be sent (DNS, refused connection, timeout).
    #[error("Connection failed to {url}: {detail}")]
    Connect { url: String, detail: String },

    /// The backend answered with a non-2xx status. The body is never decoded.
    #[error("API Error: {status} {reason}")]
    Http {
        status: u16,
        reason: String,
        url: String,
    },

    /// A handshake record carried a non-zero `result_code`.
    #[error("{message}")]
    Rejected { code: i64, message: String },

    /// The response byte stream failed mid-read.
    #[error("stream read error: {0}")]
    Stream(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ChatError {
    /// Build a rejection from a handshake, substituting the default message
    /// when the server sent none (or an empty one).
    pub fn rejected(code: i64, message: Option<&str>) -> Self {
        let message = match message {
            Some(m) if !m.trim().is_empty() => m.to_string(),
            _ => DEFAULT_REJECTION_MESSAGE.to_string(),
        };
        ChatError::Rejected { code, message }
    }

    /// True for failures of the HTTP call itself (send failure or bad status).
    pub fn is_transport(&self) -> bool {
        matches!(self, ChatError::Connect { .. } | ChatError::Http { .. })
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, ChatError::Rejected { .. })
    }
}
