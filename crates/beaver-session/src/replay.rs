//! Recorded session replays.
//!
//! A replay file describes a library, optionally a persisted thread, and a
//! sequence of steps (stream events, user messages, cancellations, item
//! deletions). Running it drives a [`ThreadSession`] against an in-memory
//! library and captures the resulting state.
//!
//! ```json
//! {
//!   "items": [{"library_id": 1, "zotero_key": "ABCD1234", "kind": "regular", "item_type": "book"}],
//!   "steps": [
//!     {"step": "stream", "event": {"type": "message_start", "message_id": "m1"}},
//!     {"step": "stream", "event": {"type": "delta", "message_id": "m1", "content": "<citation id=\"1-ABCD1234\"/>"}}
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use beaver_core::{
    ChatMessage, CitationData, InMemoryItemRepository, InputSource, InputSourceKind, ItemRef,
    LibraryItem, Result, SourceCitation, StreamEvent, ThreadSnapshot, ThreadSource,
};

use crate::config::SessionConfig;
use crate::session::ThreadSession;

const DEFAULT_THREAD_ID: &str = "replay";

/// Source selected in the input area before a user message.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplaySource {
    #[serde(flatten)]
    pub item: ItemRef,
    pub kind: InputSourceKind,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub child_item_keys: Vec<String>,
}

impl From<ReplaySource> for InputSource {
    fn from(source: ReplaySource) -> Self {
        let mut input = InputSource::new(source.item, source.kind);
        input.pinned = source.pinned;
        input.child_item_keys = source.child_item_keys;
        input
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ReplayStep {
    Stream {
        event: StreamEvent,
    },
    UserMessage {
        message_id: String,
        content: String,
        #[serde(default)]
        sources: Vec<ReplaySource>,
    },
    Cancel {
        message_id: String,
    },
    /// Remove an item from the library and notify the session.
    DeleteItem { item: ItemRef },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Replay {
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub items: Vec<LibraryItem>,
    #[serde(default)]
    pub snapshot: Option<ThreadSnapshot>,
    #[serde(default)]
    pub steps: Vec<ReplayStep>,
}

/// Session state after a replay.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayOutput {
    pub thread_id: String,
    pub messages: Vec<ChatMessage>,
    pub citations: Vec<CitationData>,
    pub cited_sources: Vec<SourceCitation>,
    pub thread_sources: Vec<ThreadSource>,
    /// Item lookups the library served during the replay.
    pub lookup_count: usize,
}

impl Replay {
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub async fn run(self, config: SessionConfig) -> Result<ReplayOutput> {
        let repo = InMemoryItemRepository::from_items(self.items);
        let shared = Arc::new(repo.clone());

        let mut session = match self.snapshot {
            Some(mut snapshot) => {
                if let Some(thread_id) = self.thread_id {
                    snapshot.thread_id = thread_id;
                }
                ThreadSession::load(snapshot, shared, config).await
            }
            None => ThreadSession::new(
                self.thread_id.as_deref().unwrap_or(DEFAULT_THREAD_ID),
                shared,
                config,
            ),
        };

        for (index, step) in self.steps.into_iter().enumerate() {
            debug!(step = index, "Replaying step");
            match step {
                ReplayStep::Stream { event } => session.apply_event(event).await?,
                ReplayStep::UserMessage {
                    message_id,
                    content,
                    sources,
                } => {
                    for source in sources {
                        session.add_input_source(source.into());
                    }
                    session.send_user_message(message_id, content).await;
                }
                ReplayStep::Cancel { message_id } => {
                    session.cancel(&message_id);
                }
                ReplayStep::DeleteItem { item } => {
                    repo.remove(&item);
                    session.invalidate_item(&item).await;
                }
            }
        }

        Ok(ReplayOutput {
            thread_id: session.thread_id().to_string(),
            messages: session.messages().to_vec(),
            citations: session.citations().to_vec(),
            cited_sources: session.cited_sources().to_vec(),
            thread_sources: session.thread_sources().to_vec(),
            lookup_count: repo.lookup_count(),
        })
    }
}
