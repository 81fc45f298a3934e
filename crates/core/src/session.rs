//! Session domain type and the pluggable store contract.
//!
//! A session is the durable conversation identity: an append-only
//! transcript plus named bookmarks into the recorded event stream. Backend
//! implementations live in `talon-sessions`; the runtime programs against
//! the [`SessionStore`] trait only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::event::{Bookmark, RunEvent};
use crate::model::ModelOutput;
use crate::tool::ToolResult;

/// One entry in a session transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscriptEntry {
    UserPrompt {
        text: String,
        timestamp: DateTime<Utc>,
    },
    ModelOutput {
        iteration: u32,
        output: ModelOutput,
    },
    ToolResult {
        iteration: u32,
        result: ToolResult,
    },
}

/// Durable conversation state. The transcript is append-only within a run;
/// the agent loop borrows the session exclusively while running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub transcript: Vec<TranscriptEntry>,
    #[serde(default)]
    pub bookmarks: Vec<Bookmark>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            transcript: Vec::new(),
            bookmarks: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// A session with a freshly generated id.
    pub fn create() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    pub fn push(&mut self, entry: TranscriptEntry) {
        self.updated_at = Utc::now();
        self.transcript.push(entry);
    }

    pub fn push_prompt(&mut self, text: impl Into<String>) {
        self.push(TranscriptEntry::UserPrompt {
            text: text.into(),
            timestamp: Utc::now(),
        });
    }

    /// Record a bookmark. Replaces an existing bookmark of the same name.
    pub fn set_bookmark(&mut self, bookmark: Bookmark) {
        self.bookmarks.retain(|b| b.name != bookmark.name);
        self.bookmarks.push(bookmark);
        self.updated_at = Utc::now();
    }

    pub fn bookmark(&self, name: &str) -> Option<&Bookmark> {
        self.bookmarks.iter().find(|b| b.name == name)
    }
}

/// The pluggable session backend contract.
///
/// Writes are serialised per session id by the implementation; reads and
/// writes for distinct ids may proceed in parallel.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Backend name for logs (`memory`, `file`, `composite`).
    fn name(&self) -> &str;

    /// Load a session. `SessionNotFound` when the id is unknown.
    async fn load(&self, id: &str) -> Result<Session>;

    /// Persist the full session state.
    async fn save(&self, session: &Session) -> Result<()>;

    /// Append one event to the session's event log.
    async fn append_event(&self, id: &str, event: &RunEvent) -> Result<()>;

    /// The recorded event log in append order. Resume replays this.
    async fn events(&self, id: &str) -> Result<Vec<RunEvent>>;

    /// Duplicate a session (transcript + bookmarks) under a new id.
    async fn fork(&self, id: &str) -> Result<String>;

    async fn list_bookmarks(&self, id: &str) -> Result<Vec<Bookmark>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bookmark_replacement_by_name() {
        let mut session = Session::create();
        session.set_bookmark(Bookmark {
            name: "b1".into(),
            sequence: 3,
            iteration: 0,
        });
        session.set_bookmark(Bookmark {
            name: "b1".into(),
            sequence: 9,
            iteration: 1,
        });
        assert_eq!(session.bookmarks.len(), 1);
        assert_eq!(session.bookmark("b1").unwrap().sequence, 9);
    }

    #[test]
    fn transcript_appends_update_timestamp() {
        let mut session = Session::new("s-1");
        let created = session.updated_at;
        session.push_prompt("hello");
        assert_eq!(session.transcript.len(), 1);
        assert!(session.updated_at >= created);
    }

    #[test]
    fn session_serde_roundtrip() {
        let mut session = Session::new("s-2");
        session.push_prompt("hi");
        session.push(TranscriptEntry::ModelOutput {
            iteration: 0,
            output: ModelOutput::text("done"),
        });
        let json = serde_json::to_string(&session).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, "s-2");
        assert_eq!(back.transcript.len(), 2);
    }
}
