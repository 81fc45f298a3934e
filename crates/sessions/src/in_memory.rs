//! Volatile in-memory session store.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use talon_core::{Bookmark, Error, Result, RunEvent, Session, SessionStore};

struct Stored {
    session: Session,
    events: Vec<RunEvent>,
}

impl Stored {
    fn empty(id: &str) -> Self {
        Self {
            session: Session::new(id),
            events: Vec::new(),
        }
    }
}

/// Map-backed store. Writes are serialised by the map lock; state is lost
/// on process exit.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<HashMap<String, Stored>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self, id: &str) -> Result<Session> {
        let inner = self.inner.read().await;
        inner
            .get(id)
            .map(|s| s.session.clone())
            .ok_or_else(|| Error::SessionNotFound(id.into()))
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .entry(session.id.clone())
            .or_insert_with(|| Stored::empty(&session.id));
        entry.session = session.clone();
        Ok(())
    }

    async fn append_event(&self, id: &str, event: &RunEvent) -> Result<()> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .entry(id.to_string())
            .or_insert_with(|| Stored::empty(id));
        entry.events.push(event.clone());
        Ok(())
    }

    async fn events(&self, id: &str) -> Result<Vec<RunEvent>> {
        let inner = self.inner.read().await;
        inner
            .get(id)
            .map(|s| s.events.clone())
            .ok_or_else(|| Error::SessionNotFound(id.into()))
    }

    async fn fork(&self, id: &str) -> Result<String> {
        let mut inner = self.inner.write().await;
        let source = inner
            .get(id)
            .ok_or_else(|| Error::SessionNotFound(id.into()))?;
        let new_id = Uuid::new_v4().to_string();
        let mut session = source.session.clone();
        session.id = new_id.clone();
        let events = source.events.clone();
        inner.insert(new_id.clone(), Stored { session, events });
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
    async fn save_then_load_roundtrips() {
        let store = InMemoryStore::new();
        let mut session = Session::new("s-1");
        session.push_prompt("hello");
        store.save(&session).await.unwrap();

        let loaded = store.load("s-1").await.unwrap();
        assert_eq!(loaded.transcript.len(), 1);
    }

    #[tokio::test]
    async fn missing_session_not_found() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.load("nope").await,
            Err(Error::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn events_append_in_order() {
        let store = InMemoryStore::new();
        store.append_event("s-1", &event(0)).await.unwrap();
        store.append_event("s-1", &event(1)).await.unwrap();
        let events = store.events("s-1").await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].sequence < events[1].sequence);
    }

    #[tokio::test]
    async fn fork_copies_state_under_new_id() {
        let store = InMemoryStore::new();
        let mut session = Session::new("s-1");
        session.push_prompt("hello");
        store.save(&session).await.unwrap();
        store.append_event("s-1", &event(0)).await.unwrap();

        let forked = store.fork("s-1").await.unwrap();
        assert_ne!(forked, "s-1");
        let copy = store.load(&forked).await.unwrap();
        assert_eq!(copy.transcript.len(), 1);
        assert_eq!(store.events(&forked).await.unwrap().len(), 1);
    }
}
