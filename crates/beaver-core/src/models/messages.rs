//! Chat thread models: messages, sources attached to messages, and the
//! streaming events the backend emits while an assistant message is written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CitationMetadata, ItemKind, ItemRef};

// =============================================================================
// MESSAGES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    InProgress,
    Completed,
    Canceled,
    Error,
}

/// One message of a chat thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: MessageRole,
    #[serde(default)]
    pub content: String,
    /// Reasoning text streamed alongside the answer; may contain citations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: MessageRole::User,
            content: content.into(),
            reasoning_content: None,
            status: MessageStatus::Completed,
            created_at: Utc::now(),
        }
    }

    /// Empty assistant message about to be streamed into.
    pub fn assistant(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: MessageRole::Assistant,
            content: String::new(),
            reasoning_content: None,
            status: MessageStatus::InProgress,
            created_at: Utc::now(),
        }
    }

    pub fn is_assistant(&self) -> bool {
        self.role == MessageRole::Assistant
    }

    /// Text fields that may carry citation markers, answer first.
    pub fn citable_texts(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.content.as_str()).chain(self.reasoning_content.as_deref())
    }
}

// =============================================================================
// THREAD SOURCES
// =============================================================================

/// How an item was attached to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadSourceKind {
    Attachment,
    Note,
    Annotation,
    /// The item open in the reader when the message was sent.
    Reader,
}

impl ThreadSourceKind {
    /// Source kind for a concrete (non-regular) item.
    pub fn for_item_kind(kind: ItemKind) -> Option<Self> {
        match kind {
            ItemKind::Attachment => Some(Self::Attachment),
            ItemKind::Note => Some(Self::Note),
            ItemKind::Annotation => Some(Self::Annotation),
            ItemKind::Regular => None,
        }
    }
}

/// A library item attached to a specific message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadSource {
    pub id: Uuid,
    #[serde(flatten)]
    pub item: ItemRef,
    pub kind: ThreadSourceKind,
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ThreadSource {
    pub fn new(item: ItemRef, kind: ThreadSourceKind, message_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            item,
            kind,
            message_id: message_id.into(),
            timestamp: Utc::now(),
        }
    }

    /// Identity used for deduplication within a thread.
    pub fn identity(&self) -> (i64, &str, &str) {
        (
            self.item.library_id,
            self.item.zotero_key.as_str(),
            self.message_id.as_str(),
        )
    }
}

/// Kind of a not-yet-sent source in the input area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputSourceKind {
    /// A regular item that expands to its child attachments and notes.
    Regular,
    Attachment,
    Note,
    Annotation,
    Reader,
}

impl InputSourceKind {
    pub fn for_item_kind(kind: ItemKind) -> Self {
        match kind {
            ItemKind::Regular => Self::Regular,
            ItemKind::Attachment => Self::Attachment,
            ItemKind::Note => Self::Note,
            ItemKind::Annotation => Self::Annotation,
        }
    }
}

/// A source selected in the input area, not yet sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSource {
    pub id: Uuid,
    #[serde(flatten)]
    pub item: ItemRef,
    pub kind: InputSourceKind,
    /// Pinned sources survive selection-driven clearing.
    #[serde(default)]
    pub pinned: bool,
    /// Selected child keys of a regular item.
    #[serde(default)]
    pub child_item_keys: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl InputSource {
    pub fn new(item: ItemRef, kind: InputSourceKind) -> Self {
        Self {
            id: Uuid::now_v7(),
            item,
            kind,
            pinned: false,
            child_item_keys: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}

// =============================================================================
// THREAD LOAD AND STREAMING
// =============================================================================

/// A previously persisted thread as returned by the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreadSnapshot {
    pub thread_id: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub citations: Vec<CitationMetadata>,
    #[serde(default)]
    pub sources: Vec<ThreadSource>,
}

/// Event streamed by the backend while an assistant message is generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {
        message_id: String,
    },
    Delta {
        message_id: String,
        content: String,
    },
    ReasoningDelta {
        message_id: String,
        content: String,
    },
    CitationMetadata {
        message_id: String,
        citations: Vec<CitationMetadata>,
    },
    Done {
        message_id: String,
    },
    Error {
        message_id: String,
        error: String,
    },
}

impl StreamEvent {
    pub fn message_id(&self) -> &str {
        match self {
            Self::MessageStart { message_id }
            | Self::Delta { message_id, .. }
            | Self::ReasoningDelta { message_id, .. }
            | Self::CitationMetadata { message_id, .. }
            | Self::Done { message_id }
            | Self::Error { message_id, .. } => message_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stream_event_wire_format() {
        let event: StreamEvent = serde_json::from_value(json!({
            "type": "delta",
            "message_id": "m1",
            "content": "see <citation id=\"c1\"/>"
        }))
        .unwrap();
        assert_eq!(event.message_id(), "m1");
        assert!(matches!(event, StreamEvent::Delta { .. }));

        let event: StreamEvent = serde_json::from_value(json!({
            "type": "citation_metadata",
            "message_id": "m1",
            "citations": [{
                "citation_id": "c1",
                "library_id": 1,
                "zotero_key": "K1",
                "message_id": "m1"
            }]
        }))
        .unwrap();
        match event {
            StreamEvent::CitationMetadata { citations, .. } => {
                assert_eq!(citations.len(), 1);
                assert_eq!(citations[0].item, ItemRef::new(1, "K1"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_citable_texts_include_reasoning() {
        let mut message = ChatMessage::assistant("m1");
        message.content = "answer".to_string();
        assert_eq!(message.citable_texts().count(), 1);
        message.reasoning_content = Some("thinking".to_string());
        let texts: Vec<&str> = message.citable_texts().collect();
        assert_eq!(texts, vec!["answer", "thinking"]);
    }

    #[test]
    fn test_thread_source_identity() {
        let source = ThreadSource::new(ItemRef::new(1, "K"), ThreadSourceKind::Note, "m1");
        assert_eq!(source.identity(), (1, "K", "m1"));
    }

    #[test]
    fn test_source_kind_mapping() {
        assert_eq!(ThreadSourceKind::for_item_kind(ItemKind::Regular), None);
        assert_eq!(
            ThreadSourceKind::for_item_kind(ItemKind::Attachment),
            Some(ThreadSourceKind::Attachment)
        );
        assert_eq!(
            InputSourceKind::for_item_kind(ItemKind::Regular),
            InputSourceKind::Regular
        );
    }
}
