//! HTTP transport for chat requests.

use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::decoder::{ChunkSink, DecodeSummary, ResponseBody, StreamingResponseDecoder};
use crate::error::ChatError;
use crate::request::ChatRequest;

/// Anything that can carry a [`ChatRequest`] to a backend and stream the
/// answer into a sink. [`ChatClient`] is the HTTP implementation; tests plug
/// in scripted backends.
#[allow(async_fn_in_trait)]
pub trait ChatBackend {
    async fn send_chat<K: ChunkSink + ?Sized>(
        &self,
        request: &ChatRequest,
        sink: &mut K,
    ) -> Result<DecodeSummary, ChatError>;
}

/// Client for the chat backend. Cheap to clone; clones share the connection
/// pool.
#[derive(Debug, Clone)]
pub struct ChatClient {
    pub(crate) config: ClientConfig,
    pub(crate) http: reqwest::Client,
}

impl ChatClient {
    /// Build a client from `config`.
    ///
    /// # Errors
    /// `ChatError::Config` when the base URL is not http(s) or the HTTP client
    /// cannot be constructed.
    pub fn new(config: ClientConfig) -> Result<Self, ChatError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ChatError::Config(format!("http client: {e}")))?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// POST `request` to the chat endpoint and decode the response into `sink`.
    ///
    /// # Returns
    /// - `Ok(DecodeSummary)` once the body is drained.
    /// - `Err(ChatError::Connect)` when the request cannot be sent.
    /// - `Err(ChatError::Http)` on a non-2xx status; the body is not decoded.
    /// - `Err(ChatError::Rejected)` when the handshake carries a non-zero code.
    /// - `Err(ChatError::Stream)` when the body fails mid-read.
    pub async fn send<K: ChunkSink + ?Sized>(
        &self,
        request: &ChatRequest,
        sink: &mut K,
    ) -> Result<DecodeSummary, ChatError> {
        let url = self.config.endpoint(&self.config.chat_path);
        debug!(
            url = %url,
            history_len = request.history.len(),
            model = ?request.model,
            "sending chat request"
        );

        let resp = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| ChatError::Connect {
                url: url.clone(),
                detail: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), url = %url, "chat request failed");
            return Err(ChatError::Http {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
                url,
            });
        }

        let summary = if self.config.streaming {
            StreamingResponseDecoder::decode(ResponseBody::Streaming(resp.bytes_stream()), sink)
                .await?
        } else {
            let text = resp
                .text()
                .await
                .map_err(|e| ChatError::Stream(e.to_string()))?;
            StreamingResponseDecoder::decode_buffered(&text, sink)
        };

        debug!(
            chunks = summary.chunks_delivered,
            bytes = summary.bytes_read,
            fallback = summary.fallback_attempted,
            "chat response drained"
        );
        Ok(summary)
    }

    /// `true` when the health endpoint answers with a 2xx status. Failures are
    /// logged, never returned.
    pub async fn health_check(&self) -> bool {
        let url = self.config.endpoint(&self.config.health_path);
        match self.http.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!(error = %e, url = %url, "health check failed");
                false
            }
        }
    }
}

impl ChatBackend for ChatClient {
    async fn send_chat<K: ChunkSink + ?Sized>(
        &self,
        request: &ChatRequest,
        sink: &mut K,
    ) -> Result<DecodeSummary, ChatError> {
        self.send(request, sink).await
    }
}
