//! Backend configuration.
//!
//! The backend address is an explicit value handed to [`ChatClient`](crate::client::ChatClient)
//! at construction. It can come from code, a TOML file, or the
//! `PROMPT_CHAT_BASE_URL` environment variable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ChatError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_CHAT_PATH: &str = "/api/chat/prompt-chat";
pub const DEFAULT_HEALTH_PATH: &str = "/api/health/check";
pub const DEFAULT_PROMPTS_PATH: &str = "/api/prompts";
pub const BASE_URL_ENV: &str = "PROMPT_CHAT_BASE_URL";

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Scheme, host and port of the backend (e.g. `http://localhost:8000`).
    pub base_url: String,
    /// Path the chat request is POSTed to.
    pub chat_path: String,
    pub health_path: String,
    /// Prefix of the prompt catalogue endpoints (`{prefix}/list`, `{prefix}/{key}`).
    pub prompts_path: String,
    pub connect_timeout: Duration,
    /// Whole-request timeout, including the time spent streaming the body.
    pub request_timeout: Duration,
    /// Decode the body incrementally. When off, the body is read once as text.
    pub streaming: bool,
    /// Directory holding persisted conversations.
    pub history_dir: PathBuf,
}

impl ClientConfig {
    /// Create a config with defaults.
    ///
    /// - chat path: `/api/chat/prompt-chat`
    /// - connect_timeout: 3 s
    /// - request_timeout: 120 s
    /// - streaming: on
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            chat_path: DEFAULT_CHAT_PATH.to_string(),
            health_path: DEFAULT_HEALTH_PATH.to_string(),
            prompts_path: DEFAULT_PROMPTS_PATH.to_string(),
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(120),
            streaming: true,
            history_dir: PathBuf::from(".prompt-chat"),
        }
    }

    pub fn chat_path(mut self, path: impl Into<String>) -> Self {
        self.chat_path = path.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn history_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.history_dir = dir.into();
        self
    }

    /// Parse a TOML document. Every key is optional; missing keys keep their
    /// defaults. Timeouts are given in seconds.
    ///
    /// ```toml
    /// base_url = "http://127.0.0.1:8000"
    /// chat_path = "/api/chat/prompt-chat"
    /// request_timeout_secs = 60
    /// streaming = true
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self, ChatError> {
        let file: ConfigFile =
            toml::from_str(text).map_err(|e| ChatError::Config(e.to_string()))?;
        let mut config = Self::default();
        if let Some(v) = file.base_url {
            config.base_url = v;
        }
        if let Some(v) = file.chat_path {
            config.chat_path = v;
        }
        if let Some(v) = file.health_path {
            config.health_path = v;
        }
        if let Some(v) = file.prompts_path {
            config.prompts_path = v;
        }
        if let Some(v) = file.connect_timeout_secs {
            config.connect_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.request_timeout_secs {
            config.request_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.streaming {
            config.streaming = v;
        }
        if let Some(v) = file.history_dir {
            config.history_dir = v;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ChatError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Override the base URL from `PROMPT_CHAT_BASE_URL` when it is set.
    pub fn apply_env(self) -> Self {
        self.apply_env_value(std::env::var(BASE_URL_ENV).ok())
    }

    fn apply_env_value(mut self, value: Option<String>) -> Self {
        if let Some(url) = value.filter(|v| !v.trim().is_empty()) {
            self.base_url = url.trim().to_string();
        }
        self
    }

    pub fn validate(&self) -> Result<(), ChatError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ChatError::Config(format!(
                "base_url must start with http:// or https://, got '{}'",
                self.base_url
            )));
        }
        Ok(())
    }

    /// Join the base URL and `path` with exactly one `/` between them.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    base_url: Option<String>,
    chat_path: Option<String>,
    health_path: Option<String>,
    prompts_path: Option<String>,
    connect_timeout_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    streaming: Option<bool>,
    history_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_config() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.base_url, "http://localhost:8000");
        assert_eq!(cfg.chat_path, "/api/chat/prompt-chat");
        assert_eq!(cfg.connect_timeout, Duration::from_secs(3));
        assert!(cfg.streaming);
    }

    #[test]
    fn test_builder_overrides() {
        let cfg = ClientConfig::new("http://example.com")
            .chat_path("/api/ai_hub/get_prompt_res_text")
            .connect_timeout(Duration::from_secs(1))
            .request_timeout(Duration::from_secs(9))
            .streaming(false)
            .history_dir("/tmp/h");
        assert_eq!(cfg.chat_path, "/api/ai_hub/get_prompt_res_text");
        assert_eq!(cfg.connect_timeout, Duration::from_secs(1));
        assert_eq!(cfg.request_timeout, Duration::from_secs(9));
        assert!(!cfg.streaming);
        assert_eq!(cfg.history_dir, PathBuf::from("/tmp/h"));
    }

    #[rstest]
    #[case("http://h:1", "/api/x", "http://h:1/api/x")]
    #[case("http://h:1/", "/api/x", "http://h:1/api/x")]
    #[case("http://h:1", "api/x", "http://h:1/api/x")]
    #[case("http://h:1//", "//api/x", "http://h:1/api/x")]
    fn test_endpoint_join(#[case] base: &str, #[case] path: &str, #[case] expected: &str) {
        assert_eq!(ClientConfig::new(base).endpoint(path), expected);
    }

    #[test]
    fn test_toml_partial_keeps_defaults() {
        let cfg = ClientConfig::from_toml_str(
            "base_url = \"https://chat.internal\"\nrequest_timeout_secs = 30\n",
        )
        .unwrap();
        assert_eq!(cfg.base_url, "https://chat.internal");
        assert_eq!(cfg.request_timeout, Duration::from_secs(30));
        assert_eq!(cfg.chat_path, DEFAULT_CHAT_PATH);
        assert!(cfg.streaming);
    }

    #[test]
    fn test_toml_all_fields() {
        let text = r#"
            base_url = "http://127.0.0.1:9000"
            chat_path = "/c"
            health_path = "/h"
            prompts_path = "/p"
            connect_timeout_secs = 2
            request_timeout_secs = 5
            streaming = false
            history_dir = "hist"
        "#;
        let cfg = ClientConfig::from_toml_str(text).unwrap();
        assert_eq!(cfg.chat_path, "/c");
        assert_eq!(cfg.health_path, "/h");
        assert_eq!(cfg.prompts_path, "/p");
        assert_eq!(cfg.connect_timeout, Duration::from_secs(2));
        assert!(!cfg.streaming);
        assert_eq!(cfg.history_dir, PathBuf::from("hist"));
    }

    #[test]
    fn test_toml_unknown_key_rejected() {
        let err = ClientConfig::from_toml_str("bogus = 1").unwrap_err();
        assert!(matches!(err, ChatError::Config(_)));
    }

    #[test]
    fn test_toml_bad_scheme_rejected() {
        let err = ClientConfig::from_toml_str("base_url = \"localhost:8000\"").unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn test_env_override() {
        let cfg = ClientConfig::default().apply_env_value(Some(" http://override:1 ".into()));
        assert_eq!(cfg.base_url, "http://override:1");
        let cfg = ClientConfig::default().apply_env_value(Some("  ".into()));
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        let cfg = ClientConfig::default().apply_env_value(None);
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.toml");
        std::fs::write(&path, "chat_path = \"/api/chat/other\"\n").unwrap();
        let cfg = ClientConfig::load(&path).unwrap();
        assert_eq!(cfg.chat_path, "/api/chat/other");
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = ClientConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ChatError::Io(_)));
    }
}
