//! Append-only JSONL transcript per session: the write-ahead log behind the
//! persisted Session Record, written by a background task draining a
//! bounded channel so callers never block on disk I/O.

use std::io::Error as IoError;
use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;

use chrono::Utc;
use cowork_protocol::Message;
use serde::Serialize;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio::sync::mpsc::Sender;
use uuid::Uuid;

#[derive(Serialize)]
struct RolloutHeader {
    session_id: String,
    started_at: String,
    provider: String,
    model: String,
}

/// Owns the rollout file's write end. Cloning shares the same background
/// writer task and file handle; every `Session` that persists holds one.
#[derive(Clone)]
pub struct RolloutRecorder {
    tx: Sender<String>,
}

impl RolloutRecorder {
    /// Creates `<rollout_dir>/rollout-<session_id>.jsonl`, appending if it
    /// already exists: reopening the same session's file on `resume` must
    /// not truncate it, including when the resume happens on a later UTC
    /// calendar day than the session started on.
    pub async fn new(
        rollout_dir: &Path,
        session_id: Uuid,
        provider: &str,
        model: &str,
    ) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(rollout_dir).await?;
        let path = rollout_path(rollout_dir, session_id);
        let is_new = !path.exists();

        let file = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .await?;

        let (tx, mut rx) = mpsc::channel::<String>(256);
        tokio::task::spawn(async move {
            let mut file = file;
            while let Some(line) = rx.recv().await {
                if let Err(e) = file.write_all(line.as_bytes()).await {
                    tracing::warn!("rollout writer: failed to write line: {e}");
                    break;
                }
                if let Err(e) = file.write_all(b"\n").await {
                    tracing::warn!("rollout writer: failed to write newline: {e}");
                    break;
                }
                if let Err(e) = file.flush().await {
                    tracing::warn!("rollout writer: failed to flush: {e}");
                    break;
                }
            }
        });

        let recorder = Self { tx };
        if is_new {
            let header = RolloutHeader {
                session_id: session_id.to_string(),
                started_at: Utc::now().to_rfc3339(),
                provider: provider.to_string(),
                model: model.to_string(),
            };
            recorder.append_json(&header).await?;
        }
        Ok(recorder)
    }

    /// Appends `messages` not yet written to this session's transcript.
    /// Callers pass only the newly produced tail; the recorder performs no
    /// dedup of its own.
    pub async fn record_messages(&self, messages: &[Message]) -> std::io::Result<()> {
        for message in messages {
            self.append_json(message).await?;
        }
        Ok(())
    }

    async fn append_json(&self, value: &impl Serialize) -> std::io::Result<()> {
        let json = serde_json::to_string(value)
            .map_err(|e| IoError::new(ErrorKind::Other, format!("failed to serialize rollout entry: {e}")))?;
        self.tx
            .send(json)
            .await
            .map_err(|e| IoError::new(ErrorKind::Other, format!("failed to queue rollout entry: {e}")))
    }
}

fn rollout_path(rollout_dir: &Path, session_id: Uuid) -> PathBuf {
    rollout_dir.join(format!("rollout-{session_id}.jsonl"))
}

/// Replays a session's transcript back into a `Vec<Message>`, skipping the
/// leading header line. Used by `resume` when no fresher in-memory
/// `Session` exists.
pub async fn replay(rollout_dir: &Path, session_id: Uuid) -> std::io::Result<Vec<Message>> {
    let mut entries = tokio::fs::read_dir(rollout_dir).await?;
    let needle = session_id.to_string();
    let mut path = None;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name().to_string_lossy().contains(&needle) {
            path = Some(entry.path());
            break;
        }
    }
    let Some(path) = path else {
        return Ok(Vec::new());
    };

    let file = tokio::fs::File::open(&path).await?;
    let mut lines = BufReader::new(file).lines();
    let mut messages = Vec::new();
    let mut first = true;
    while let Some(line) = lines.next_line().await? {
        if first {
            first = false;
            continue;
        }
        if let Ok(message) = serde_json::from_str::<Message>(&line) {
            messages.push(message);
        }
    }
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cowork_protocol::Message;

    #[tokio::test]
    async fn records_and_replays_messages() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let session_id = Uuid::new_v4();
        let recorder = RolloutRecorder::new(tmp.path(), session_id, "google", "gemini-3-flash-preview")
            .await
            .expect("new recorder");

        let messages = vec![Message::user_text("hi"), Message::assistant_text("hello")];
        recorder.record_messages(&messages).await.expect("record");

        // Give the background writer a moment to flush.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let replayed = replay(tmp.path(), session_id).await.expect("replay");
        assert_eq!(replayed, messages);
    }
}
