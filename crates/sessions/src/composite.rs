//! Composite store — routes session ids to different backends by prefix.
//!
//! The first matching prefix wins; ids matching no prefix go to the default
//! backend. Forked sessions keep their prefix so they stay on the same
//! backend.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use talon_core::{Bookmark, Result, RunEvent, Session, SessionStore};

pub struct CompositeStore {
    routes: Vec<(String, Arc<dyn SessionStore>)>,
    fallback: Arc<dyn SessionStore>,
}

impl CompositeStore {
    pub fn new(fallback: Arc<dyn SessionStore>) -> Self {
        Self {
            routes: Vec::new(),
            fallback,
        }
    }

    /// Route ids starting with `prefix` to `store`. Registration order is
    /// match order.
    pub fn route(mut self, prefix: impl Into<String>, store: Arc<dyn SessionStore>) -> Self {
        self.routes.push((prefix.into(), store));
        self
    }

    fn backend(&self, id: &str) -> &Arc<dyn SessionStore> {
        self.routes
            .iter()
            .find(|(prefix, _)| id.starts_with(prefix.as_str()))
            .map(|(_, store)| store)
            .unwrap_or(&self.fallback)
    }

    fn prefix_of(&self, id: &str) -> Option<&str> {
        self.routes
            .iter()
            .map(|(prefix, _)| prefix.as_str())
            .find(|prefix| id.starts_with(prefix))
    }
}

#[async_trait]
impl SessionStore for CompositeStore {
    fn name(&self) -> &str {
        "composite"
    }

    async fn load(&self, id: &str) -> Result<Session> {
        self.backend(id).load(id).await
    }

    async fn save(&self, session: &Session) -> Result<()> {
        self.backend(&session.id).save(session).await
    }

    async fn append_event(&self, id: &str, event: &RunEvent) -> Result<()> {
        self.backend(id).append_event(id, event).await
    }

    async fn events(&self, id: &str) -> Result<Vec<RunEvent>> {
        self.backend(id).events(id).await
    }

    async fn fork(&self, id: &str) -> Result<String> {
        // Forking inside the routed backend would lose the prefix, so the
        // copy is made here with a prefix-preserving id.
        let backend = self.backend(id);
        let mut session = backend.load(id).await?;
        let new_id = match self.prefix_of(id) {
            Some(prefix) => format!("{prefix}{}", Uuid::new_v4()),
            None => Uuid::new_v4().to_string(),
        };
        session.id = new_id.clone();
        backend.save(&session).await?;
        for event in backend.events(id).await.unwrap_or_default() {
            backend.append_event(&new_id, &event).await?;
        }
        Ok(new_id)
    }

    async fn list_bookmarks(&self, id: &str) -> Result<Vec<Bookmark>> {
        self.backend(id).list_bookmarks(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryStore;

    fn composite() -> (CompositeStore, Arc<InMemoryStore>, Arc<InMemoryStore>) {
        let durable = Arc::new(InMemoryStore::new());
        let scratch = Arc::new(InMemoryStore::new());
        let store = CompositeStore::new(scratch.clone()).route("ci-", durable.clone());
        (store, durable, scratch)
    }

    #[tokio::test]
    async fn ids_route_by_prefix() {
        let (store, durable, scratch) = composite();
        store.save(&Session::new("ci-123")).await.unwrap();
        store.save(&Session::new("adhoc-1")).await.unwrap();

        assert!(durable.load("ci-123").await.is_ok());
        assert!(durable.load("adhoc-1").await.is_err());
        assert!(scratch.load("adhoc-1").await.is_ok());
    }

    #[tokio::test]
    async fn fork_preserves_prefix() {
        let (store, durable, _scratch) = composite();
        let mut session = Session::new("ci-123");
        session.push_prompt("hi");
        store.save(&session).await.unwrap();

        let forked = store.fork("ci-123").await.unwrap();
        assert!(forked.starts_with("ci-"));
        assert!(durable.load(&forked).await.is_ok());
    }

    #[tokio::test]
    async fn fallback_handles_unmatched_ids() {
        let (store, _durable, scratch) = composite();
        store.save(&Session::new("misc")).await.unwrap();
        assert_eq!(scratch.load("misc").await.unwrap().id, "misc");
        assert_eq!(store.load("misc").await.unwrap().id, "misc");
    }
}
