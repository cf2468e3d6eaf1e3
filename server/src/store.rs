//! Persisted Session Record: a JSON-file-per-session store, keyed by
//! `sessionId`, the compacted snapshot the rollout write-ahead log backs up.

use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use cowork_protocol::Message;
use cowork_protocol::SessionStatus;
use cowork_protocol::TodoItem;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub title_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub title_model: Option<String>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub provider: String,
    pub model: String,
    pub working_directory: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub output_directory: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub uploads_directory: Option<PathBuf>,
    #[serde(default)]
    pub enable_mcp: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub system_prompt: Option<String>,

    pub has_pending_ask: bool,
    pub has_pending_approval: bool,
    pub message_count: usize,
    pub last_event_seq: u64,

    pub messages_json: Vec<Message>,
    pub todos_json: Vec<TodoItem>,
    #[serde(default)]
    pub harness_context_json: serde_json::Value,
}

/// Storage seam for persisted session records. A trait, not a concrete type,
/// so `cowork-server` can swap the JSON-file backend for a real database
/// without touching the Session Registry. Schemas beyond the session record
/// itself are out of scope here; the record just needs somewhere durable to
/// live.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, record: &SessionRecord) -> std::io::Result<()>;
    async fn load(&self, session_id: Uuid) -> std::io::Result<Option<SessionRecord>>;
    async fn list(&self) -> std::io::Result<Vec<SessionRecord>>;
}

pub struct JsonFileSessionStore {
    dir: PathBuf,
}

impl JsonFileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, session_id: Uuid) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }
}

#[async_trait]
impl SessionStore for JsonFileSessionStore {
    async fn save(&self, record: &SessionRecord) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        tokio::fs::write(self.path_for(record.session_id), json).await
    }

    async fn load(&self, session_id: Uuid) -> std::io::Result<Option<SessionRecord>> {
        let path = self.path_for(session_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let record = serde_json::from_slice(&bytes)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
                Ok(Some(record))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list(&self) -> std::io::Result<Vec<SessionRecord>> {
        list_json_records(&self.dir).await
    }
}

async fn list_json_records(dir: &Path) -> std::io::Result<Vec<SessionRecord>> {
    let mut records = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(records),
        Err(e) => return Err(e),
    };
    while let Some(entry) = entries.next_entry().await? {
        if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Ok(bytes) = tokio::fs::read(entry.path()).await
            && let Ok(record) = serde_json::from_slice::<SessionRecord>(&bytes)
        {
            records.push(record);
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: Uuid) -> SessionRecord {
        let now = Utc::now();
        SessionRecord {
            session_id: id,
            title: None,
            title_source: None,
            title_model: None,
            status: SessionStatus::Open,
            created_at: now,
            updated_at: now,
            provider: "google".to_string(),
            model: "gemini-3-flash-preview".to_string(),
            working_directory: PathBuf::from("/tmp"),
            output_directory: None,
            uploads_directory: None,
            enable_mcp: false,
            system_prompt: None,
            has_pending_ask: false,
            has_pending_approval: false,
            message_count: 0,
            last_event_seq: 0,
            messages_json: Vec::new(),
            todos_json: Vec::new(),
            harness_context_json: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn round_trips_a_record() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = JsonFileSessionStore::new(tmp.path());
        let id = Uuid::new_v4();
        store.save(&sample(id)).await.expect("save");

        let loaded = store.load(id).await.expect("load").expect("present");
        assert_eq!(loaded.session_id, id);
        assert_eq!(loaded.provider, "google");

        let all = store.list().await.expect("list");
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn missing_record_is_none() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = JsonFileSessionStore::new(tmp.path());
        assert!(store.load(Uuid::new_v4()).await.expect("load").is_none());
    }
}
