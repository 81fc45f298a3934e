//! Durable file-backed session store.
//!
//! Layout under the store directory, per session id:
//!
//! * `<id>.json` — snapshot of the full [`Session`] (transcript + bookmarks),
//!   rewritten atomically on every `save`
//! * `<id>.log`  — append-only event log of framed records (see
//!   [`crate::record`])
//!
//! On first access after a crash the log is scanned; a partially written
//! tail is truncated at the last valid record boundary and the repair is
//! logged. Writes are serialised per session id; distinct ids proceed in
//! parallel.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use talon_core::{Bookmark, Error, Result, RunEvent, Session, SessionStore};

use crate::record;

pub struct FileStore {
    dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FileStore {
    /// Open (or create) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::StorageUnavailable(format!("create {}: {e}", dir.display())))?;
        Ok(Self {
            dir,
            locks: Mutex::new(HashMap::new()),
        })
    }

    async fn id_lock(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn snapshot_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn log_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.log"))
    }

    fn read_snapshot(&self, id: &str) -> Result<Session> {
        let path = self.snapshot_path(id);
        let bytes = std::fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::SessionNotFound(id.into())
            } else {
                Error::StorageUnavailable(format!("read {}: {e}", path.display()))
            }
        })?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::StorageUnavailable(format!("decode {}: {e}", path.display())))
    }

    fn write_snapshot(&self, session: &Session) -> Result<()> {
        let path = self.snapshot_path(&session.id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(session)?;
        std::fs::write(&tmp, &bytes)
            .map_err(|e| Error::StorageUnavailable(format!("write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| Error::StorageUnavailable(format!("rename {}: {e}", path.display())))?;
        Ok(())
    }

    /// Scan the log, repairing a torn tail in place.
    fn scan_log(&self, id: &str) -> Result<Vec<RunEvent>> {
        let path = self.log_path(id);
        let buf = match std::fs::read(&path) {
            Ok(buf) => buf,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::StorageUnavailable(format!(
                    "read {}: {e}",
                    path.display()
                )))
            }
        };

        let scan = record::scan(&buf);
        if scan.truncated {
            warn!(
                session = %id,
                valid_len = scan.valid_len,
                total_len = buf.len(),
                "torn tail in session log, truncating at last valid record"
            );
            truncate_file(&path, scan.valid_len)?;
        }

        let mut events = Vec::with_capacity(scan.payloads.len());
        for payload in scan.payloads {
            let event: RunEvent = serde_json::from_slice(&payload)?;
            events.push(event);
        }
        Ok(events)
    }
}

fn truncate_file(path: &Path, len: u64) -> Result<()> {
    let file = std::fs::OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| Error::StorageUnavailable(format!("open {}: {e}", path.display())))?;
    file.set_len(len)
        .map_err(|e| Error::StorageUnavailable(format!("truncate {}: {e}", path.display())))
}

#[async_trait]
impl SessionStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self, id: &str) -> Result<Session> {
        let lock = self.id_lock(id).await;
        let _guard = lock.lock().await;
        self.read_snapshot(id)
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let lock = self.id_lock(&session.id).await;
        let _guard = lock.lock().await;
        debug!(session = %session.id, entries = session.transcript.len(), "snapshot saved");
        self.write_snapshot(session)
    }

    async fn append_event(&self, id: &str, event: &RunEvent) -> Result<()> {
        let lock = self.id_lock(id).await;
        let _guard = lock.lock().await;
        let framed = record::encode(&serde_json::to_vec(event)?)?;
        let path = self.log_path(id);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::StorageUnavailable(format!("open {}: {e}", path.display())))?;
        file.write_all(&framed)
            .map_err(|e| Error::StorageUnavailable(format!("append {}: {e}", path.display())))?;
        Ok(())
    }

    async fn events(&self, id: &str) -> Result<Vec<RunEvent>> {
        let lock = self.id_lock(id).await;
        let _guard = lock.lock().await;
        if !self.snapshot_path(id).exists() && !self.log_path(id).exists() {
            return Err(Error::SessionNotFound(id.into()));
        }
        self.scan_log(id)
    }

    async fn fork(&self, id: &str) -> Result<String> {
        let lock = self.id_lock(id).await;
        let _guard = lock.lock().await;
        let mut session = self.read_snapshot(id)?;
        let new_id = Uuid::new_v4().to_string();
        session.id = new_id.clone();
        self.write_snapshot(&session)?;
        if self.log_path(id).exists() {
            std::fs::copy(self.log_path(id), self.log_path(&new_id))
                .map_err(|e| Error::StorageUnavailable(format!("copy log: {e}")))?;
        }
        Ok(new_id)
    }

    async fn list_bookmarks(&self, id: &str) -> Result<Vec<Bookmark>> {
        Ok(self.load(id).await?.bookmarks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use talon_core::EventPayload;
    use tempfile::TempDir;

    fn event(seq: u64) -> RunEvent {
        RunEvent {
            correlation_id: "run-1".into(),
            sequence: seq,
            timestamp: Utc::now(),
            payload: EventPayload::ProgressDelta {
                text: format!("delta {seq}"),
            },
        }
    }

    #[tokio::test]
    async fn snapshot_roundtrip_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = FileStore::open(dir.path()).unwrap();
            let mut session = Session::new("s-1");
            session.push_prompt("hello");
            session.set_bookmark(Bookmark {
                name: "b1".into(),
                sequence: 4,
                iteration: 1,
            });
            store.save(&session).await.unwrap();
        }
        let store = FileStore::open(dir.path()).unwrap();
        let loaded = store.load("s-1").await.unwrap();
        assert_eq!(loaded.transcript.len(), 1);
        assert_eq!(loaded.bookmark("b1").unwrap().sequence, 4);
    }

    #[tokio::test]
    async fn events_append_and_replay() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        for seq in 0..3 {
            store.append_event("s-1", &event(seq)).await.unwrap();
        }
        let events = store.events("s-1").await.unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].sequence, 2);
    }

    #[tokio::test]
    async fn torn_tail_is_truncated_on_scan() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.append_event("s-1", &event(0)).await.unwrap();
        store.append_event("s-1", &event(1)).await.unwrap();

        // Simulate a crash mid-append: write half a frame.
        let log = dir.path().join("s-1.log");
        let valid_len = std::fs::metadata(&log).unwrap().len();
        let torn = record::encode(b"interrupted record").unwrap();
        let mut file = std::fs::OpenOptions::new().append(true).open(&log).unwrap();
        file.write_all(&torn[..torn.len() / 2]).unwrap();
        drop(file);

        let events = store.events("s-1").await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(std::fs::metadata(&log).unwrap().len(), valid_len);

        // Appends continue cleanly after the repair.
        store.append_event("s-1", &event(2)).await.unwrap();
        assert_eq!(store.events("s-1").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn fork_copies_snapshot_and_log() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let mut session = Session::new("s-1");
        session.push_prompt("hi");
        store.save(&session).await.unwrap();
        store.append_event("s-1", &event(0)).await.unwrap();

        let forked = store.fork("s-1").await.unwrap();
        let copy = store.load(&forked).await.unwrap();
        assert_eq!(copy.id, forked);
        assert_eq!(copy.transcript.len(), 1);
        assert_eq!(store.events(&forked).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.load("ghost").await,
            Err(Error::SessionNotFound(_))
        ));
        assert!(matches!(
            store.events("ghost").await,
            Err(Error::SessionNotFound(_))
        ));
    }
}
