//! JSON file record store

use super::types::{AgentSessionRecord, ConversationRecord, ScoreRecord};
use super::RecordStore;
use crate::error::{RelayError, RelayResult};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const CONVERSATIONS_FILE: &str = "conversations.json";
const AGENT_SESSIONS_FILE: &str = "agent_sessions.json";
const SCORES_FILE: &str = "scores.json";

/// One JSON array file per collection under a data directory
///
/// Clones share the per-collection write locks, so saves through any clone are
/// serialized.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    data_dir: PathBuf,
    write_locks: Arc<WriteLocks>,
}

#[derive(Debug, Default)]
struct WriteLocks {
    conversations: Mutex<()>,
    agent_sessions: Mutex<()>,
    scores: Mutex<()>,
}

impl WriteLocks {
    fn for_file(&self, file: &str) -> &Mutex<()> {
        match file {
            CONVERSATIONS_FILE => &self.conversations,
            AGENT_SESSIONS_FILE => &self.agent_sessions,
            _ => &self.scores,
        }
    }
}

impl JsonFileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            write_locks: Arc::new(WriteLocks::default()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Read a collection; missing, unreadable or corrupt files read as empty
    async fn read_collection<T: DeserializeOwned>(&self, file: &str) -> Vec<T> {
        let path = self.data_dir.join(file);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("failed to read {}: {}", path.display(), e);
                return Vec::new();
            }
        };
        if raw.trim().is_empty() {
            return Vec::new();
        }
        match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(e) => {
                warn!("ignoring corrupt collection {}: {}", path.display(), e);
                Vec::new()
            }
        }
    }

    /// Replace a collection with `records` via a uniquely named temp file and rename
    async fn write_collection<T: Serialize>(&self, file: &str, records: &[T]) -> RelayResult<()> {
        let _guard = self.write_locks.for_file(file).lock().await;

        fs::create_dir_all(&self.data_dir).await.map_err(|e| {
            RelayError::storage(format!(
                "failed to create data dir {}: {}",
                self.data_dir.display(),
                e
            ))
        })?;

        let path = self.data_dir.join(file);
        let tmp = self
            .data_dir
            .join(format!(".{}.{}.tmp", file, uuid::Uuid::new_v4()));
        let content = serde_json::to_string_pretty(records)?;

        if let Err(e) = fs::write(&tmp, content).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(RelayError::storage(format!(
                "failed to write {}: {}",
                tmp.display(),
                e
            )));
        }
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(RelayError::storage(format!(
                "failed to replace {}: {}",
                path.display(),
                e
            )));
        }

        debug!(file, count = records.len(), "saved collection");
        Ok(())
    }
}

#[async_trait]
impl RecordStore for JsonFileStore {
    async fn conversations(&self) -> RelayResult<Vec<ConversationRecord>> {
        Ok(self.read_collection(CONVERSATIONS_FILE).await)
    }

    async fn save_conversations(&self, records: &[ConversationRecord]) -> RelayResult<()> {
        self.write_collection(CONVERSATIONS_FILE, records).await
    }

    async fn agent_sessions(&self) -> RelayResult<Vec<AgentSessionRecord>> {
        Ok(self.read_collection(AGENT_SESSIONS_FILE).await)
    }

    async fn save_agent_sessions(&self, records: &[AgentSessionRecord]) -> RelayResult<()> {
        self.write_collection(AGENT_SESSIONS_FILE, records).await
    }

    async fn scores(&self) -> RelayResult<Vec<ScoreRecord>> {
        Ok(self.read_collection(SCORES_FILE).await)
    }

    async fn save_scores(&self, records: &[ScoreRecord]) -> RelayResult<()> {
        self.write_collection(SCORES_FILE, records).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::ChatMessage;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_files_read_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested"));
        assert!(store.conversations().await.unwrap().is_empty());
        assert!(store.scores().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("data"));

        let mut conv = ConversationRecord::new("u1", "腹痛问诊", 10);
        conv.messages.push(ChatMessage::user("你好", 11));
        store.save_conversations(&[conv.clone()]).await.unwrap();

        let reloaded = JsonFileStore::new(dir.path().join("data"));
        assert_eq!(reloaded.conversations().await.unwrap(), vec![conv]);

        let raw = std::fs::read_to_string(dir.path().join("data").join(CONVERSATIONS_FILE)).unwrap();
        assert!(raw.contains("\"userId\": \"u1\""));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_saves_never_expose_partial_files() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("data"));
        let records: Vec<ConversationRecord> = (0..200)
            .map(|i| ConversationRecord::new("u1", format!("问诊 {}", i), i))
            .collect();
        store.save_conversations(&records).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            let records = records.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..50 {
                    store.save_conversations(&records).await.unwrap();
                    assert_eq!(store.conversations().await.unwrap().len(), 200);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("data"))
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_separate_instances_share_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let first = JsonFileStore::new(dir.path());
        let second = JsonFileStore::new(dir.path());
        let conv = ConversationRecord::new("u1", "问诊", 1);

        let (a, b) = tokio::join!(
            first.save_conversations(std::slice::from_ref(&conv)),
            second.save_conversations(std::slice::from_ref(&conv)),
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(first.conversations().await.unwrap(), vec![conv]);
    }

    #[tokio::test]
    async fn test_corrupt_file_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(SCORES_FILE), "{not json").unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.scores().await.unwrap().is_empty());
    }
}
