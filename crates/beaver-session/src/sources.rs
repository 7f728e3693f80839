//! Sources attached to messages.
//!
//! [`InputSources`] holds what the user has selected in the input area.
//! Sending a message commits them into [`ThreadSource`]s for that message;
//! the thread-wide list is kept free of duplicate (library, key, message)
//! entries by [`aggregate_thread_sources`].

use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use tracing::{debug, warn};

use beaver_core::{
    InputSource, InputSourceKind, ItemRef, ItemRepository, LibraryItem, ThreadSource,
    ThreadSourceKind,
};

/// Deduplicate thread sources by (library ID, item key, message ID).
///
/// Of duplicate entries the one with the earliest timestamp survives. The
/// result is ordered by timestamp; ties keep their order of appearance.
pub fn aggregate_thread_sources(
    sources: impl IntoIterator<Item = ThreadSource>,
) -> Vec<ThreadSource> {
    let mut kept: Vec<ThreadSource> = Vec::new();
    let mut index: HashMap<(i64, String, String), usize> = HashMap::new();

    for source in sources {
        let key = (
            source.item.library_id,
            source.item.zotero_key.clone(),
            source.message_id.clone(),
        );
        match index.get(&key) {
            Some(&position) => {
                if source.timestamp < kept[position].timestamp {
                    kept[position] = source;
                }
            }
            None => {
                index.insert(key, kept.len());
                kept.push(source);
            }
        }
    }

    kept.sort_by_key(|source| source.timestamp);
    kept
}

/// Whether an item can be sent as a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceValidity {
    Valid,
    /// The item no longer resolves.
    Missing,
    Unsupported(String),
}

impl SourceValidity {
    pub fn is_valid(&self) -> bool {
        matches!(self, SourceValidity::Valid)
    }
}

/// Check that `item` exists and, for attachments, is a PDF with its file
/// available locally.
pub async fn validate_source(repo: &dyn ItemRepository, item: &ItemRef) -> SourceValidity {
    match repo.get_by_library_and_key(item).await {
        Ok(Some(found)) => validity_of(&found),
        Ok(None) => SourceValidity::Missing,
        Err(e) => {
            warn!(
                library_id = item.library_id,
                item_key = %item.zotero_key,
                error = %e,
                "Source validation lookup failed, treating as missing"
            );
            SourceValidity::Missing
        }
    }
}

fn validity_of(item: &LibraryItem) -> SourceValidity {
    if !item.is_attachment() {
        return SourceValidity::Valid;
    }
    if !item.is_pdf_attachment() {
        return SourceValidity::Unsupported("only PDF attachments are supported".to_string());
    }
    if !item.file_available {
        return SourceValidity::Unsupported("attachment file is not available".to_string());
    }
    SourceValidity::Valid
}

/// Sources selected in the input area, in the order they were added.
#[derive(Debug, Clone, Default)]
pub struct InputSources {
    sources: Vec<InputSource>,
}

impl InputSources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source; returns false if the item was already present.
    ///
    /// A re-added item keeps its pin and gains any new child keys.
    pub fn add(&mut self, source: InputSource) -> bool {
        match self.sources.iter_mut().find(|s| s.item == source.item) {
            Some(existing) => {
                for key in source.child_item_keys {
                    if !existing.child_item_keys.contains(&key) {
                        existing.child_item_keys.push(key);
                    }
                }
                false
            }
            None => {
                self.sources.push(source);
                true
            }
        }
    }

    pub fn remove(&mut self, item: &ItemRef) -> Option<InputSource> {
        let position = self.sources.iter().position(|s| &s.item == item)?;
        Some(self.sources.remove(position))
    }

    /// Flip the pin of `item`; returns the new state, or `None` if absent.
    pub fn toggle_pin(&mut self, item: &ItemRef) -> Option<bool> {
        let source = self.sources.iter_mut().find(|s| &s.item == item)?;
        source.pinned = !source.pinned;
        Some(source.pinned)
    }

    /// Drop every source that is not pinned; returns how many were dropped.
    pub fn clear_unpinned(&mut self) -> usize {
        let before = self.sources.len();
        self.sources.retain(|s| s.pinned);
        before - self.sources.len()
    }

    pub fn reset(&mut self) {
        self.sources.clear();
    }

    pub fn as_slice(&self) -> &[InputSource] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Validity of every input source, in order.
    pub async fn validate(&self, repo: &dyn ItemRepository) -> Vec<(ItemRef, SourceValidity)> {
        let checks = self
            .sources
            .iter()
            .map(|source| validate_source(repo, &source.item));
        let results = join_all(checks).await;
        self.sources
            .iter()
            .map(|source| source.item.clone())
            .zip(results)
            .collect()
    }

    /// Turn the current inputs into thread sources for `message_id` and
    /// clear the unpinned ones.
    ///
    /// Regular items expand into their selected children, or into all of
    /// their attachments and notes when none were selected. Children that
    /// no longer resolve are skipped.
    pub async fn commit(&mut self, message_id: &str, repo: &dyn ItemRepository) -> Vec<ThreadSource> {
        let timestamp = Utc::now();
        let mut committed = Vec::new();

        for source in &self.sources {
            let expanded: Vec<(ItemRef, ThreadSourceKind)> = match source.kind {
                InputSourceKind::Regular => expand_regular(source, repo).await,
                InputSourceKind::Attachment => vec![(source.item.clone(), ThreadSourceKind::Attachment)],
                InputSourceKind::Note => vec![(source.item.clone(), ThreadSourceKind::Note)],
                InputSourceKind::Annotation => {
                    vec![(source.item.clone(), ThreadSourceKind::Annotation)]
                }
                InputSourceKind::Reader => vec![(source.item.clone(), ThreadSourceKind::Reader)],
            };
            committed.extend(expanded.into_iter().map(|(item, kind)| ThreadSource {
                timestamp,
                ..ThreadSource::new(item, kind, message_id)
            }));
        }

        let dropped = self.clear_unpinned();
        debug!(
            message_id,
            result_count = committed.len(),
            cleared = dropped,
            "Committed input sources"
        );
        aggregate_thread_sources(committed)
    }
}

async fn expand_regular(
    source: &InputSource,
    repo: &dyn ItemRepository,
) -> Vec<(ItemRef, ThreadSourceKind)> {
    let children = if source.child_item_keys.is_empty() {
        match repo.get_children(&source.item).await {
            Ok(children) => children,
            Err(e) => {
                warn!(
                    library_id = source.item.library_id,
                    item_key = %source.item.zotero_key,
                    error = %e,
                    "Failed to list child items, skipping source"
                );
                Vec::new()
            }
        }
    } else {
        let refs: Vec<ItemRef> = source
            .child_item_keys
            .iter()
            .map(|key| source.item.sibling(key.as_str()))
            .collect();
        join_all(refs.iter().map(|item| repo.get_by_library_and_key(item)))
            .await
            .into_iter()
            .filter_map(|result| match result {
                Ok(found) => found,
                Err(e) => {
                    warn!(error = %e, "Child item lookup failed, skipping");
                    None
                }
            })
            .collect()
    };

    children
        .into_iter()
        .filter_map(|child| {
            ThreadSourceKind::for_item_kind(child.kind).map(|kind| (child.item_ref, kind))
        })
        .collect()
}
