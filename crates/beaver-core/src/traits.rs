//! Core traits for Beaver abstractions.
//!
//! The Zotero host is reached only through these traits, so the citation
//! pipeline can run against the live application or an in-memory fake.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// ITEM REPOSITORY
// =============================================================================

/// Read-only access to the host's library items.
///
/// `Ok(None)` means the item does not exist (deleted, moved, library gone).
/// `Err` is reserved for failures of the host itself; callers in the
/// citation pipeline treat both the same way for output purposes.
#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Fetch an item by library ID and key.
    async fn get_by_library_and_key(&self, item: &ItemRef) -> Result<Option<LibraryItem>>;

    /// Fetch the parent of an item, if it has one.
    async fn get_parent(&self, item: &LibraryItem) -> Result<Option<LibraryItem>> {
        match item.parent_ref() {
            Some(parent) => self.get_by_library_and_key(&parent).await,
            None => Ok(None),
        }
    }

    /// Child attachments and notes of a regular item.
    async fn get_children(&self, item: &ItemRef) -> Result<Vec<LibraryItem>>;

    /// Path of the cached render of an image annotation, if the host has one.
    async fn annotation_image_path(&self, item: &LibraryItem) -> Result<Option<PathBuf>>;
}
