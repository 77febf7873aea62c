//! Remote prompt catalogue: `GET {prompts_path}/list` and
//! `GET {prompts_path}/{key}`.
//!
//! Both calls degrade instead of failing; the caller always gets a value it
//! can render.

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::client::ChatClient;
use crate::error::ChatError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptList {
    #[serde(default)]
    pub prompts: Vec<String>,
    #[serde(default)]
    pub total: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptContent {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PromptContent {
    fn failed(key: &str, error: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            content: String::new(),
            error: Some(error.into()),
        }
    }
}

impl ChatClient {
    /// List prompt keys. Any failure yields an empty list.
    pub async fn list_prompts(&self) -> PromptList {
        let url = self.config.endpoint(&format!("{}/list", self.config.prompts_path));
        match self.get_json::<PromptList>(&url).await {
            Ok(list) => list,
            Err(e) => {
                error!(error = %e, url = %url, "failed to fetch prompts list");
                PromptList::default()
            }
        }
    }

    /// Fetch one prompt body. Any failure, including the backend's own
    /// `{"error": ...}` answer for an unknown key, yields empty content with
    /// `error` set.
    pub async fn prompt_content(&self, key: &str) -> PromptContent {
        let url = self
            .config
            .endpoint(&format!("{}/{}", self.config.prompts_path, key));
        match self.get_json::<PromptContent>(&url).await {
            Ok(prompt) if prompt.error.is_some() => PromptContent::failed(key, prompt.error.unwrap_or_default()),
            Ok(mut prompt) => {
                if prompt.key.is_empty() {
                    prompt.key = key.to_string();
                }
                prompt
            }
            Err(e) => {
                error!(error = %e, key, "failed to fetch prompt content");
                PromptContent::failed(key, e.to_string())
            }
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ChatError> {
        let resp = self.http.get(url).send().await.map_err(|e| ChatError::Connect {
            url: url.to_string(),
            detail: e.to_string(),
        })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ChatError::Http {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
                url: url.to_string(),
            });
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ChatError::Stream(e.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
