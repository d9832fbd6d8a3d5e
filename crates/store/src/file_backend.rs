//! File-based store: persistent JSON-lines storage.
//!
//! Each line is one step's latest conversation:
//! `{"step_id": "...", "saved_at": "...", "messages": [...]}`.
//!
//! Storage location defaults to `~/.mendstream/conversations.jsonl`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mendstream_core::{ConversationMessage, ConversationStore, StepId, StoreError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredConversation {
    step_id: StepId,
    saved_at: DateTime<Utc>,
    messages: Vec<ConversationMessage>,
}

/// A file-backed store using JSONL (one record per step).
///
/// Records are loaded on creation and the whole file is rewritten on every
/// mutation, so reads are fast and writes are durable.
pub struct FileStore {
    path: PathBuf,
    records: Arc<RwLock<Vec<StoredConversation>>>,
}

impl FileStore {
    /// Open the store at `path`. A missing file means an empty store; the
    /// file is created on first write.
    pub fn new(path: PathBuf) -> Self {
        let records = Self::load_from_disk(&path);
        debug!(path = %path.display(), count = records.len(), "File conversation store loaded");
        Self {
            path,
            records: Arc::new(RwLock::new(records)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(path: &Path) -> Vec<StoredConversation> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<StoredConversation>(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted conversation record");
                    None
                }
            })
            .collect()
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let records = self.records.read().await;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Storage(format!("Failed to create store directory: {e}"))
            })?;
        }

        let mut content = String::new();
        for record in records.iter() {
            let line = serde_json::to_string(record)?;
            content.push_str(&line);
            content.push('\n');
        }

        std::fs::write(&self.path, &content)
            .map_err(|e| StoreError::Storage(format!("Failed to write store file: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl ConversationStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn save(&self, step: &StepId, messages: &[ConversationMessage]) -> Result<(), StoreError> {
        let record = StoredConversation {
            step_id: step.clone(),
            saved_at: Utc::now(),
            messages: messages.to_vec(),
        };
        {
            let mut records = self.records.write().await;
            match records.iter_mut().find(|r| &r.step_id == step) {
                Some(existing) => *existing = record,
                None => records.push(record),
            }
        }
        self.flush().await
    }

    async fn load(&self, step: &StepId) -> Result<Option<Vec<ConversationMessage>>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .find(|r| &r.step_id == step)
            .map(|r| r.messages.clone()))
    }

    async fn clear(&self, step: &StepId) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        let len_before = records.len();
        records.retain(|r| &r.step_id != step);
        let removed = records.len() < len_before;
        drop(records);
        if removed {
            self.flush().await?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mendstream_core::MessagePart;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_path() -> PathBuf {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        drop(tmp); // Close file so the store can recreate it
        path
    }

    fn healed_conversation() -> Vec<ConversationMessage> {
        vec![
            ConversationMessage::user("Build a revenue dashboard"),
            ConversationMessage::assistant(vec![MessagePart::tool_call("c1", "createDashboards", json!({}))]),
            ConversationMessage::tool(vec![MessagePart::tool_error("c1", "createDashboards", "not available")]),
        ]
    }

    #[tokio::test]
    async fn save_and_reload_persists() {
        let path = temp_path();
        let store = FileStore::new(path.clone());
        let step = StepId::from("think-and-prep");
        store.save(&step, &healed_conversation()).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("createDashboards"));
        assert_eq!(content.lines().count(), 1);

        let reopened = FileStore::new(path);
        assert_eq!(reopened.load(&step).await.unwrap(), Some(healed_conversation()));
    }

    #[tokio::test]
    async fn save_overwrites_same_step() {
        let path = temp_path();
        let store = FileStore::new(path.clone());
        let step = StepId::from("s");
        store.save(&step, &[ConversationMessage::user("old")]).await.unwrap();
        store.save(&step, &[ConversationMessage::user("new")]).await.unwrap();
        store.save(&StepId::from("other"), &[]).await.unwrap();

        let reopened = FileStore::new(path);
        let messages = reopened.load(&step).await.unwrap().unwrap();
        assert_eq!(messages, vec![ConversationMessage::user("new")]);
    }

    #[tokio::test]
    async fn clear_persists() {
        let path = temp_path();
        let store = FileStore::new(path.clone());
        let step = StepId::from("s");
        store.save(&step, &[ConversationMessage::user("q")]).await.unwrap();
        assert!(store.clear(&step).await.unwrap());

        let reopened = FileStore::new(path);
        assert!(reopened.load(&step).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("conversations.jsonl");
        let store = FileStore::new(path.clone());
        store.save(&StepId::from("s"), &[]).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn handles_corrupted_lines() {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(
            tmp,
            r#"{{"step_id":"a","saved_at":"2026-01-01T00:00:00Z","messages":[{{"role":"user","content":"hi"}}]}}"#
        )
        .unwrap();
        writeln!(tmp, "this is not json").unwrap();
        let store = FileStore::new(tmp.path().to_path_buf());
        let messages = store.load(&StepId::from("a")).await.unwrap().unwrap();
        assert_eq!(messages, vec![ConversationMessage::user("hi")]);
    }
}
