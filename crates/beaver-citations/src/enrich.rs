//! Item enrichment shared by the resolver and the source aggregator.
//!
//! Turns an item reference into display fields by looking the item up in
//! the host and formatting whichever item should back the citation: a note
//! cites itself, anything else cites its top-level parent when one exists.

use std::sync::Arc;

use beaver_core::{CitationEnrichment, ItemRef, ItemRepository, LibraryItem, Result};

use crate::format;

/// Annotation -> attachment -> regular item.
const MAX_PARENT_DEPTH: usize = 2;

#[derive(Clone)]
pub struct ItemEnricher {
    repo: Arc<dyn ItemRepository>,
    user_library_id: i64,
}

impl ItemEnricher {
    pub fn new(repo: Arc<dyn ItemRepository>, user_library_id: i64) -> Self {
        Self {
            repo,
            user_library_id,
        }
    }

    pub fn repository(&self) -> &Arc<dyn ItemRepository> {
        &self.repo
    }

    /// Resolve display fields for `item_ref`.
    ///
    /// Returns `Ok(None)` when the item does not exist; host failures are
    /// passed through for the caller to log and degrade.
    pub async fn enrich(
        &self,
        item_ref: &ItemRef,
        page: Option<u32>,
    ) -> Result<Option<CitationEnrichment>> {
        let Some(item) = self.repo.get_by_library_and_key(item_ref).await? else {
            return Ok(None);
        };

        let parent = self.item_to_cite(&item).await?;
        let cited = parent.as_ref().unwrap_or(&item);

        let preview_image = if item.is_annotation() {
            self.repo
                .annotation_image_path(&item)
                .await?
                .map(|path| path.display().to_string())
        } else {
            None
        };

        let name = if item.is_annotation() {
            Some(format::annotation_name(&item))
        } else {
            format::display_name(cited)
        };

        Ok(Some(CitationEnrichment {
            parent_key: item.parent_key.clone(),
            cited_key: parent.as_ref().map(|top| top.item_ref.zotero_key.clone()),
            icon: Some(item.icon()),
            name,
            citation: format::short_citation(cited),
            formatted_citation: format::full_citation(cited),
            url: Some(format::item_uri(&item, page, self.user_library_id)),
            preview_image,
        }))
    }

    /// Top-level parent to cite instead of `item`, or `None` to cite the
    /// item itself.
    ///
    /// This climbs past the immediate parent: an annotation cites the
    /// regular item above its attachment, not the attachment. Stops after
    /// [`MAX_PARENT_DEPTH`] levels.
    async fn item_to_cite(&self, item: &LibraryItem) -> Result<Option<LibraryItem>> {
        if item.is_note() {
            return Ok(None);
        }

        let mut top: Option<LibraryItem> = None;
        for _ in 0..MAX_PARENT_DEPTH {
            let parent = self.repo.get_parent(top.as_ref().unwrap_or(item)).await?;
            match parent {
                Some(parent) => top = Some(parent),
                None => break,
            }
        }
        Ok(top)
    }
}
