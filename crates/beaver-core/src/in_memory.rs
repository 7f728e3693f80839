//! In-memory item repository.
//!
//! Stands in for the Zotero host in tests and in the replay tool. Every
//! lookup is logged so callers can assert how often the host was queried,
//! and individual items can be given artificial latency or made to fail.
//!
//! ## Usage
//!
//! ```rust
//! use beaver_core::{InMemoryItemRepository, ItemKind, ItemRef, ItemRepository, LibraryItem};
//!
//! # tokio_test_block(async {
//! let repo = InMemoryItemRepository::new().with_item(LibraryItem::new(
//!     ItemRef::new(1, "ABCD1234"),
//!     ItemKind::Regular,
//!     "journalArticle",
//! ));
//!
//! let item = repo
//!     .get_by_library_and_key(&ItemRef::new(1, "ABCD1234"))
//!     .await
//!     .unwrap();
//! assert!(item.is_some());
//! assert_eq!(repo.lookup_count(), 1);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::models::{AnnotationType, ItemRef, LibraryItem};
use crate::traits::ItemRepository;

/// Repository operation recorded by [`InMemoryItemRepository`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOperation {
    GetByKey,
    GetChildren,
    AnnotationImage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupCall {
    pub operation: LookupOperation,
    pub item: ItemRef,
}

#[derive(Debug, Default)]
struct RepositoryState {
    items: HashMap<ItemRef, LibraryItem>,
    latencies: HashMap<ItemRef, Duration>,
    failing: HashSet<ItemRef>,
    annotation_images: HashMap<ItemRef, PathBuf>,
    calls: Vec<LookupCall>,
}

/// Item repository backed by a hash map.
#[derive(Clone, Default)]
pub struct InMemoryItemRepository {
    state: Arc<Mutex<RepositoryState>>,
}

impl InMemoryItemRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: impl IntoIterator<Item = LibraryItem>) -> Self {
        let repo = Self::new();
        for item in items {
            repo.insert(item);
        }
        repo
    }

    pub fn with_item(self, item: LibraryItem) -> Self {
        self.insert(item);
        self
    }

    /// Delay every lookup of `item` by `latency`.
    pub fn with_latency(self, item: ItemRef, latency: Duration) -> Self {
        self.lock().latencies.insert(item, latency);
        self
    }

    /// Make lookups of `item` fail as if the host raised an error.
    pub fn with_failure(self, item: ItemRef) -> Self {
        self.lock().failing.insert(item);
        self
    }

    pub fn with_annotation_image(self, item: ItemRef, path: impl Into<PathBuf>) -> Self {
        self.lock().annotation_images.insert(item, path.into());
        self
    }

    /// Add or replace an item.
    pub fn insert(&self, item: LibraryItem) {
        self.lock().items.insert(item.item_ref.clone(), item);
    }

    /// Delete an item, as if the user removed it from the library.
    pub fn remove(&self, item: &ItemRef) -> Option<LibraryItem> {
        self.lock().items.remove(item)
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<LookupCall> {
        self.lock().calls.clone()
    }

    /// Number of item lookups by key.
    pub fn lookup_count(&self) -> usize {
        self.count(|call| call.operation == LookupOperation::GetByKey)
    }

    /// Number of lookups by key for one item.
    pub fn lookup_count_for(&self, item: &ItemRef) -> usize {
        self.count(|call| call.operation == LookupOperation::GetByKey && &call.item == item)
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn count(&self, predicate: impl Fn(&LookupCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    fn lock(&self) -> MutexGuard<'_, RepositoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a call and return the latency to simulate for it.
    fn record(&self, operation: LookupOperation, item: &ItemRef) -> Option<Duration> {
        let mut state = self.lock();
        state.calls.push(LookupCall {
            operation,
            item: item.clone(),
        });
        state.latencies.get(item).copied()
    }
}

#[async_trait]
impl ItemRepository for InMemoryItemRepository {
    async fn get_by_library_and_key(&self, item: &ItemRef) -> Result<Option<LibraryItem>> {
        if let Some(latency) = self.record(LookupOperation::GetByKey, item) {
            tokio::time::sleep(latency).await;
        }

        let state = self.lock();
        if state.failing.contains(item) {
            return Err(Error::Lookup(format!("simulated host failure for {}", item)));
        }
        Ok(state.items.get(item).cloned())
    }

    async fn get_children(&self, item: &ItemRef) -> Result<Vec<LibraryItem>> {
        self.record(LookupOperation::GetChildren, item);

        let state = self.lock();
        let mut children: Vec<LibraryItem> = state
            .items
            .values()
            .filter(|child| {
                child.item_ref.library_id == item.library_id
                    && child.parent_key.as_deref() == Some(item.zotero_key.as_str())
                    && !child.is_annotation()
            })
            .cloned()
            .collect();
        children.sort_by(|a, b| a.item_ref.cmp(&b.item_ref));
        Ok(children)
    }

    async fn annotation_image_path(&self, item: &LibraryItem) -> Result<Option<PathBuf>> {
        self.record(LookupOperation::AnnotationImage, &item.item_ref);

        let is_image = item
            .annotation
            .as_ref()
            .is_some_and(|a| a.annotation_type == AnnotationType::Image);
        if !is_image {
            return Ok(None);
        }
        Ok(self.lock().annotation_images.get(&item.item_ref).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemKind;

    fn article(key: &str) -> LibraryItem {
        LibraryItem::new(ItemRef::new(1, key), ItemKind::Regular, "journalArticle")
    }

    #[tokio::test]
    async fn test_lookup_found_and_missing() {
        let repo = InMemoryItemRepository::new().with_item(article("A"));

        let found = repo.get_by_library_and_key(&ItemRef::new(1, "A")).await;
        assert!(found.unwrap().is_some());

        let missing = repo.get_by_library_and_key(&ItemRef::new(1, "B")).await;
        assert!(missing.unwrap().is_none());

        assert_eq!(repo.lookup_count(), 2);
        assert_eq!(repo.lookup_count_for(&ItemRef::new(1, "A")), 1);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let repo = InMemoryItemRepository::new()
            .with_item(article("A"))
            .with_failure(ItemRef::new(1, "A"));

        let err = repo
            .get_by_library_and_key(&ItemRef::new(1, "A"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Lookup(_)));
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn test_remove_item() {
        let repo = InMemoryItemRepository::from_items(vec![article("A"), article("B")]);
        assert_eq!(repo.len(), 2);
        assert!(repo.remove(&ItemRef::new(1, "A")).is_some());
        let gone = repo.get_by_library_and_key(&ItemRef::new(1, "A")).await;
        assert!(gone.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_children_and_parent() {
        let attachment = LibraryItem::new(ItemRef::new(1, "ATT"), ItemKind::Attachment, "attachment")
            .with_parent("A");
        let note = LibraryItem::new(ItemRef::new(1, "NOTE"), ItemKind::Note, "note").with_parent("A");
        let other_library = LibraryItem::new(ItemRef::new(2, "ATT2"), ItemKind::Attachment, "attachment")
            .with_parent("A");
        let repo = InMemoryItemRepository::from_items(vec![
            article("A"),
            attachment.clone(),
            note,
            other_library,
        ]);

        let children = repo.get_children(&ItemRef::new(1, "A")).await.unwrap();
        let keys: Vec<&str> = children.iter().map(|c| c.item_ref.zotero_key.as_str()).collect();
        assert_eq!(keys, vec!["ATT", "NOTE"]);

        let parent = repo.get_parent(&attachment).await.unwrap().unwrap();
        assert_eq!(parent.item_ref, ItemRef::new(1, "A"));
    }

    #[tokio::test]
    async fn test_annotation_image_only_for_image_annotations() {
        use crate::models::AnnotationFields;

        let mut image = LibraryItem::new(ItemRef::new(1, "IMG"), ItemKind::Annotation, "annotation");
        image.annotation = Some(AnnotationFields {
            annotation_type: AnnotationType::Image,
            text: None,
            comment: None,
            page_label: None,
            position: None,
        });
        let mut highlight = image.clone();
        highlight.item_ref = ItemRef::new(1, "HL");
        if let Some(a) = highlight.annotation.as_mut() {
            a.annotation_type = AnnotationType::Highlight;
        }

        let repo = InMemoryItemRepository::new()
            .with_annotation_image(ItemRef::new(1, "IMG"), "/cache/IMG.png")
            .with_annotation_image(ItemRef::new(1, "HL"), "/cache/HL.png");

        assert_eq!(
            repo.annotation_image_path(&image).await.unwrap(),
            Some(PathBuf::from("/cache/IMG.png"))
        );
        assert_eq!(repo.annotation_image_path(&highlight).await.unwrap(), None);
    }
}
