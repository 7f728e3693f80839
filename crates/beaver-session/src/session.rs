//! Per-thread session state.
//!
//! A [`ThreadSession`] owns everything derived for the active chat thread:
//! messages, the citation metadata store, resolved citations, the cited
//! source list, thread and input sources, and the caches behind them. It is
//! created when a thread is opened (empty or from history) and dropped on
//! thread switch, which is the only point where the store and caches are
//! cleared.
//!
//! Updates arrive one trigger at a time: a stream event, a user action or a
//! host notification. Each trigger completes its state update before the
//! next one is applied.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;
use tracing::{debug, info, instrument, trace};

use beaver_citations::{
    Aggregation, CitationCache, CitationMetadataStore, CitationResolver, MarkerScanner,
    SourceAggregator, SourceCache,
};
use beaver_core::{
    ChatMessage, CitationData, CitationMetadata, Error, EventBus, EventEnvelope, InputSource,
    ItemRef, ItemRepository, MessageStatus, Result, SessionEvent, SourceCitation, StreamEvent,
    ThreadSnapshot, ThreadSource,
};

use crate::cancel::{CancelHandle, CancelRegistry};
use crate::config::SessionConfig;
use crate::sources::{aggregate_thread_sources, InputSources, SourceValidity};

/// Marker scanners for the two streamed text fields of one message.
#[derive(Debug, Default)]
struct StreamScanners {
    content: MarkerScanner,
    reasoning: MarkerScanner,
}

pub struct ThreadSession {
    thread_id: String,
    config: SessionConfig,
    repo: Arc<dyn ItemRepository>,
    resolver: CitationResolver,
    aggregator: SourceAggregator,

    messages: Vec<ChatMessage>,
    store: CitationMetadataStore,
    citation_cache: CitationCache,
    citations: Vec<CitationData>,
    source_cache: SourceCache,
    cited_sources: Vec<SourceCitation>,
    /// Set when a cached source was invalidated; the next aggregation pass
    /// rebuilds the list instead of short-circuiting on it.
    sources_stale: bool,
    thread_sources: Vec<ThreadSource>,
    input_sources: InputSources,

    cancels: CancelRegistry,
    scanners: HashMap<String, StreamScanners>,
    events: EventBus,
}

impl ThreadSession {
    /// Empty session for a new thread.
    pub fn new(
        thread_id: impl Into<String>,
        repo: Arc<dyn ItemRepository>,
        config: SessionConfig,
    ) -> Self {
        let resolver = CitationResolver::new(repo.clone())
            .with_concurrency(config.lookup_concurrency)
            .with_user_library_id(config.user_library_id);
        let aggregator = SourceAggregator::new(repo.clone())
            .with_concurrency(config.lookup_concurrency)
            .with_user_library_id(config.user_library_id)
            .with_policy(config.missing_source_policy);
        let events = EventBus::new(config.event_bus_capacity);

        Self {
            thread_id: thread_id.into(),
            config,
            repo,
            resolver,
            aggregator,
            messages: Vec::new(),
            store: CitationMetadataStore::new(),
            citation_cache: CitationCache::new(),
            citations: Vec::new(),
            source_cache: SourceCache::new(),
            cited_sources: Vec::new(),
            sources_stale: false,
            thread_sources: Vec::new(),
            input_sources: InputSources::new(),
            cancels: CancelRegistry::default(),
            scanners: HashMap::new(),
            events,
        }
    }

    /// Session for a previously persisted thread.
    ///
    /// All stored citation metadata is resolved in one concurrent pass and
    /// the cited source list is built once.
    #[instrument(skip_all, fields(subsystem = "session", op = "load", thread_id = %snapshot.thread_id))]
    pub async fn load(
        snapshot: ThreadSnapshot,
        repo: Arc<dyn ItemRepository>,
        config: SessionConfig,
    ) -> Self {
        let started = Instant::now();
        let mut session = Self::new(snapshot.thread_id, repo, config);

        session.messages = snapshot.messages;
        session.store.upsert(snapshot.citations);
        session.thread_sources = aggregate_thread_sources(snapshot.sources);

        session.resolve_citations(None).await;
        session.aggregate_sources(None).await;

        info!(
            message_count = session.messages.len(),
            citation_count = session.citations.len(),
            source_count = session.cited_sources.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Thread loaded"
        );
        session.emit(SessionEvent::ThreadLoaded {
            thread_id: session.thread_id.clone(),
            message_count: session.messages.len(),
            citation_count: session.citations.len(),
        });
        session
    }

    /// Apply one streaming event from the backend.
    ///
    /// Events for a canceled message are ignored. Deltas re-run source
    /// aggregation when they complete a marker with a new ID; citation
    /// metadata is stored and the citation list re-resolved.
    pub async fn apply_event(&mut self, event: StreamEvent) -> Result<()> {
        let message_id = event.message_id().to_string();
        if self.cancels.is_canceled(&message_id) {
            trace!(message_id = %message_id, "Ignoring event for canceled message");
            return Ok(());
        }

        match event {
            StreamEvent::MessageStart { message_id } => {
                if self.message(&message_id).is_none() {
                    self.messages.push(ChatMessage::assistant(message_id.clone()));
                }
                self.cancels.handle(&message_id);
                self.scanners.insert(message_id, StreamScanners::default());
            }
            StreamEvent::Delta { message_id, content } => {
                let message = self.message_mut(&message_id)?;
                message.content.push_str(&content);
                let buffer = message.content.clone();
                let scanners = self.scanners.entry(message_id.clone()).or_default();
                if !scanners.content.feed(&buffer).is_empty() {
                    self.aggregate_sources(Some(&message_id)).await;
                }
            }
            StreamEvent::ReasoningDelta { message_id, content } => {
                let message = self.message_mut(&message_id)?;
                let reasoning = message.reasoning_content.get_or_insert_with(String::new);
                reasoning.push_str(&content);
                let buffer = reasoning.clone();
                let scanners = self.scanners.entry(message_id.clone()).or_default();
                if !scanners.reasoning.feed(&buffer).is_empty() {
                    self.aggregate_sources(Some(&message_id)).await;
                }
            }
            StreamEvent::CitationMetadata {
                message_id,
                citations,
            } => {
                self.receive_metadata(&message_id, citations).await;
            }
            StreamEvent::Done { message_id } => {
                self.message_mut(&message_id)?.status = MessageStatus::Completed;
                self.scanners.remove(&message_id);
            }
            StreamEvent::Error { message_id, error } => {
                debug!(message_id = %message_id, error = %error, "Message stream failed");
                self.message_mut(&message_id)?.status = MessageStatus::Error;
                self.scanners.remove(&message_id);
            }
        }
        Ok(())
    }

    async fn receive_metadata(&mut self, message_id: &str, citations: Vec<CitationMetadata>) {
        let records: Vec<CitationMetadata> = citations
            .into_iter()
            .map(|mut record| {
                if record.message_id.is_empty() {
                    record.message_id = message_id.to_string();
                }
                record
            })
            .collect();

        let summary = self.store.upsert(records);
        debug!(
            message_id,
            inserted = summary.inserted,
            updated = summary.updated,
            "Citation metadata received"
        );
        if summary.changed() {
            self.resolve_citations(Some(message_id)).await;
            self.aggregate_sources(Some(message_id)).await;
        }
    }

    /// Re-resolve the citation list; results are dropped if `message_id`
    /// was canceled while lookups were in flight.
    async fn resolve_citations(&mut self, message_id: Option<&str>) {
        let records = self.resolvable_records();
        let resolution = self
            .resolver
            .resolve_cached(&records, &self.citation_cache)
            .await;

        if let Some(message_id) = message_id {
            if self.cancels.is_canceled(message_id) {
                debug!(message_id, "Message canceled during resolution, discarding results");
                return;
            }
        }

        resolution.commit(&mut self.citation_cache);
        let changed = resolution.citations != self.citations;
        self.citations = resolution.citations;
        if changed {
            self.emit(SessionEvent::CitationsUpdated {
                thread_id: self.thread_id.clone(),
                citation_count: self.citations.len(),
            });
        }
    }

    /// Stored metadata minus records of canceled messages that were not
    /// committed before the cancel.
    fn resolvable_records(&self) -> Vec<CitationMetadata> {
        let committed: HashSet<&str> = self
            .citations
            .iter()
            .map(CitationData::citation_id)
            .collect();
        self.store
            .get_all()
            .iter()
            .filter(|record| {
                !self.cancels.is_canceled(&record.message_id)
                    || committed.contains(record.citation_id.as_str())
            })
            .cloned()
            .collect()
    }

    /// Re-run source aggregation; see [`resolve_citations`](Self::resolve_citations)
    /// for how cancellation applies.
    async fn aggregate_sources(&mut self, message_id: Option<&str>) -> bool {
        let existing: &[SourceCitation] = if self.sources_stale {
            &[]
        } else {
            &self.cited_sources
        };
        let outcome = self
            .aggregator
            .aggregate(&self.messages, &self.store, existing, &self.source_cache)
            .await;

        if let Some(message_id) = message_id {
            if self.cancels.is_canceled(message_id) {
                debug!(message_id, "Message canceled during aggregation, discarding results");
                return false;
            }
        }

        if outcome == Aggregation::Unchanged {
            return false;
        }
        let Some(sources) = outcome.commit(&mut self.source_cache) else {
            return false;
        };
        self.sources_stale = false;
        if sources == self.cited_sources {
            return false;
        }

        self.cited_sources = sources;
        self.emit(SessionEvent::SourcesUpdated {
            thread_id: self.thread_id.clone(),
            source_count: self.cited_sources.len(),
        });
        true
    }

    /// Rebuild the cited source list; returns whether it changed.
    pub async fn refresh_sources(&mut self) -> bool {
        self.aggregate_sources(None).await
    }

    /// Cancel a streaming message.
    ///
    /// Lookups already in flight for it finish but their results are not
    /// written; later events for the message are ignored. Returns false if
    /// the message was already canceled and marked as such.
    pub fn cancel(&mut self, message_id: &str) -> bool {
        let first = self.cancels.cancel(message_id);
        let mut interrupted = false;
        if let Ok(message) = self.message_mut(message_id) {
            if message.status == MessageStatus::InProgress {
                message.status = MessageStatus::Canceled;
                interrupted = true;
            }
        }
        if !first && !interrupted {
            return false;
        }
        self.scanners.remove(message_id);
        info!(thread_id = %self.thread_id, message_id, "Message canceled");
        self.emit(SessionEvent::MessageCanceled {
            thread_id: self.thread_id.clone(),
            message_id: message_id.to_string(),
        });
        true
    }

    /// Shared cancel flag for `message_id`, for callers that need to cancel
    /// while a session call is awaiting.
    pub fn cancel_handle(&mut self, message_id: &str) -> CancelHandle {
        self.cancels.handle(message_id)
    }

    /// Record a user message and attach the current input sources to it.
    ///
    /// Returns the thread sources created for the message.
    pub async fn send_user_message(
        &mut self,
        message_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Vec<ThreadSource> {
        let message = ChatMessage::user(message_id, content);
        let message_id = message.id.clone();
        self.messages.push(message);

        let committed = self
            .input_sources
            .commit(&message_id, self.repo.as_ref())
            .await;
        if !committed.is_empty() {
            let mut merged = std::mem::take(&mut self.thread_sources);
            merged.extend(committed.iter().cloned());
            self.thread_sources = aggregate_thread_sources(merged);
            self.emit(SessionEvent::ThreadSourcesUpdated {
                thread_id: self.thread_id.clone(),
                message_id,
                source_count: committed.len(),
            });
        }
        committed
    }

    /// Add a source to the input area; returns false if already present.
    pub fn add_input_source(&mut self, source: InputSource) -> bool {
        self.input_sources.add(source)
    }

    pub fn remove_input_source(&mut self, item: &ItemRef) -> Option<InputSource> {
        self.input_sources.remove(item)
    }

    pub fn toggle_input_pin(&mut self, item: &ItemRef) -> Option<bool> {
        self.input_sources.toggle_pin(item)
    }

    /// Selection changed in the library: drop every unpinned input source.
    pub fn clear_unpinned_inputs(&mut self) -> usize {
        self.input_sources.clear_unpinned()
    }

    pub fn reset_input_sources(&mut self) {
        self.input_sources.reset();
    }

    /// Validity of each input source, in order.
    pub async fn validate_input_sources(&self) -> Vec<(ItemRef, SourceValidity)> {
        self.input_sources.validate(self.repo.as_ref()).await
    }

    /// The host reported that `item` changed or was deleted.
    ///
    /// Drops everything cached for it, including citations of its children
    /// that display its fields, and re-resolves so the next state reflects
    /// the item as it is now. Returns how many cache entries were dropped.
    pub async fn invalidate_item(&mut self, item: &ItemRef) -> usize {
        let mut dropped = self.citation_cache.remove_where(|_, citation| {
            citation.enrichment.derived_from(&citation.metadata.item, item)
        });
        let sources_dropped = self.source_cache.remove_where(|source, enrichment| {
            source == item
                || enrichment
                    .as_ref()
                    .is_some_and(|enrichment| enrichment.derived_from(source, item))
        });
        if sources_dropped > 0 {
            dropped += sources_dropped;
            self.sources_stale = true;
        }
        debug!(
            library_id = item.library_id,
            item_key = %item.zotero_key,
            dropped,
            "Item invalidated"
        );

        if dropped > 0 {
            self.resolve_citations(None).await;
            self.aggregate_sources(None).await;
        }
        dropped
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.events.subscribe()
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn message(&self, message_id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    /// Stored citation metadata, in arrival order.
    pub fn metadata(&self) -> &[CitationMetadata] {
        self.store.get_all()
    }

    /// Resolved citations, numbered in metadata order.
    pub fn citations(&self) -> &[CitationData] {
        &self.citations
    }

    /// Citations belonging to one message.
    pub fn citations_for<'a>(
        &'a self,
        message_id: &'a str,
    ) -> impl Iterator<Item = &'a CitationData> + 'a {
        self.citations
            .iter()
            .filter(move |c| c.metadata.message_id == message_id)
    }

    /// Distinct items cited anywhere in the thread.
    pub fn cited_sources(&self) -> &[SourceCitation] {
        &self.cited_sources
    }

    pub fn thread_sources(&self) -> &[ThreadSource] {
        &self.thread_sources
    }

    pub fn input_sources(&self) -> &[InputSource] {
        self.input_sources.as_slice()
    }

    fn message_mut(&mut self, message_id: &str) -> Result<&mut ChatMessage> {
        self.messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| Error::NotFound(format!("message {}", message_id)))
    }

    fn emit(&self, event: SessionEvent) {
        if self.config.emit_events {
            self.events.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beaver_core::{InMemoryItemRepository, ItemKind, LibraryItem};

    fn repo() -> InMemoryItemRepository {
        InMemoryItemRepository::from_items(vec![
            LibraryItem::new(ItemRef::new(1, "AAAA1111"), ItemKind::Regular, "book").with_title("A"),
        ])
    }

    fn session(repo: &InMemoryItemRepository) -> ThreadSession {
        ThreadSession::new("t1", Arc::new(repo.clone()), SessionConfig::default())
    }

    #[tokio::test]
    async fn test_delta_for_unknown_message_is_not_found() {
        let mut session = session(&repo());
        let err = session
            .apply_event(StreamEvent::Delta {
                message_id: "nope".into(),
                content: "x".into(),
            })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_partial_marker_waits_for_completion() {
        let repo = repo();
        let mut session = session(&repo);
        session
            .apply_event(StreamEvent::MessageStart { message_id: "m1".into() })
            .await
            .unwrap();

        for chunk in ["See <citation id=\"1-AAAA", "1111\"", "/> done"] {
            session
                .apply_event(StreamEvent::Delta {
                    message_id: "m1".into(),
                    content: chunk.into(),
                })
                .await
                .unwrap();
            if chunk != "/> done" {
                assert!(session.cited_sources().is_empty());
            }
        }
        assert_eq!(session.cited_sources().len(), 1);
        assert_eq!(repo.lookup_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_is_reported_once() {
        let mut session = session(&repo());
        let mut events = session.subscribe();
        session
            .apply_event(StreamEvent::MessageStart { message_id: "m1".into() })
            .await
            .unwrap();

        assert!(session.cancel("m1"));
        assert!(!session.cancel("m1"));
        assert_eq!(session.message("m1").unwrap().status, MessageStatus::Canceled);
        let envelope = events.recv().await.unwrap();
        assert_eq!(envelope.event_type, "message.canceled");
    }
}
