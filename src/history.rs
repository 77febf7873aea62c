//! File-backed conversation persistence, one JSON document per chat endpoint.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::error;

use crate::conversation::ChatMessage;
use crate::error::ChatError;

#[derive(Debug, Clone)]
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `chat_history_{api_path}` with everything outside `[A-Za-z0-9_-]`
    /// replaced by `_`.
    pub fn storage_key(api_path: &str) -> String {
        let sanitized: String = api_path
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        format!("chat_history_{sanitized}")
    }

    pub fn path_for(&self, api_path: &str) -> PathBuf {
        self.dir.join(format!("{}.json", Self::storage_key(api_path)))
    }

    /// Saved messages for `api_path`. A missing or unreadable file gives an
    /// empty conversation.
    pub fn load(&self, api_path: &str) -> Vec<ChatMessage> {
        let path = self.path_for(api_path);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                error!(error = %e, path = %path.display(), "failed to read chat history");
                return Vec::new();
            }
        };
        match serde_json::from_str(&text) {
            Ok(messages) => messages,
            Err(e) => {
                error!(error = %e, path = %path.display(), "failed to load chat history");
                Vec::new()
            }
        }
    }

    pub fn save(&self, api_path: &str, messages: &[ChatMessage]) -> Result<(), ChatError> {
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(messages)?;
        std::fs::write(self.path_for(api_path), json)?;
        Ok(())
    }

    pub fn clear(&self, api_path: &str) -> Result<(), ChatError> {
        match std::fs::remove_file(self.path_for(api_path)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Role;

    #[test]
    fn test_storage_key_sanitizes_path() {
        assert_eq!(
            HistoryStore::storage_key("/api/chat/prompt-chat"),
            "chat_history__api_chat_prompt-chat"
        );
        assert_eq!(HistoryStore::storage_key("basic"), "chat_history_basic");
    }

    #[test]
    fn test_path_for_lives_in_dir() {
        let store = HistoryStore::new("/tmp/pc-history");
        let path = store.path_for("/api/chat/basic");
        assert_eq!(path.parent(), Some(store.dir()));
        assert_eq!(path.file_name().unwrap(), "chat_history__api_chat_basic.json");
    }

    #[test]
    fn test_load_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        assert!(store.load("/api/x").is_empty());
    }

    #[test]
    fn test_save_then_load_preserves_order_and_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("nested"));
        let messages = vec![
            ChatMessage::new(Role::User, "question"),
            ChatMessage::new(Role::Assistant, "answer\nwith newline"),
        ];
        store.save("/api/x", &messages).unwrap();
        let loaded = store.load("/api/x");
        assert_eq!(loaded, messages);
    }

    #[test]
    fn test_endpoints_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        store.save("/a", &[ChatMessage::new(Role::User, "a")]).unwrap();
        assert!(store.load("/b").is_empty());
        assert_eq!(store.load("/a").len(), 1);
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        std::fs::write(store.path_for("/api/x"), "{not json").unwrap();
        assert!(store.load("/api/x").is_empty());
    }

    #[test]
    fn test_clear_removes_file_and_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        store.save("/api/x", &[ChatMessage::new(Role::User, "q")]).unwrap();
        store.clear("/api/x").unwrap();
        assert!(!store.path_for("/api/x").exists());
        store.clear("/api/x").unwrap();
    }
}
