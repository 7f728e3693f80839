//! Core data models for Beaver.
//!
//! These types are shared across all Beaver crates: references to Zotero
//! library items, the host's item snapshots, and the citation records that
//! flow from the backend to the message footer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::defaults;
use crate::error::Error;

pub mod messages;

pub use messages::*;

// =============================================================================
// ITEM REFERENCES
// =============================================================================

/// Identity of a Zotero item: library plus item key.
///
/// The textual form is `"{library_id}-{zotero_key}"`, e.g. `"1-ABCD1234"`,
/// which is also what citation markers use when they point at an item
/// directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemRef {
    pub library_id: i64,
    pub zotero_key: String,
}

impl ItemRef {
    pub fn new(library_id: i64, zotero_key: impl Into<String>) -> Self {
        Self {
            library_id,
            zotero_key: zotero_key.into(),
        }
    }

    /// Reference to another item in the same library.
    pub fn sibling(&self, zotero_key: impl Into<String>) -> Self {
        Self::new(self.library_id, zotero_key)
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.library_id, self.zotero_key)
    }
}

impl FromStr for ItemRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (library, key) = s
            .split_once('-')
            .ok_or_else(|| Error::InvalidInput(format!("not an item reference: {}", s)))?;
        let library_id: i64 = library
            .parse()
            .map_err(|_| Error::InvalidInput(format!("invalid library id in: {}", s)))?;
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::InvalidInput(format!("invalid item key in: {}", s)));
        }
        Ok(Self::new(library_id, key))
    }
}

// =============================================================================
// LIBRARY ITEMS (host snapshots)
// =============================================================================

/// Broad classification of a Zotero item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Regular,
    Attachment,
    Note,
    Annotation,
}

/// A creator (author, editor, ...) of a regular item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    /// Family name, or the full name for single-field creators.
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
}

impl Creator {
    pub fn new(last_name: impl Into<String>, first_name: Option<&str>) -> Self {
        Self {
            last_name: last_name.into(),
            first_name: first_name.map(String::from),
        }
    }

    /// `"Smith, J."` style with initials.
    pub fn with_initials(&self) -> String {
        match self.first_name.as_deref().filter(|f| !f.trim().is_empty()) {
            Some(first) => {
                let initials: Vec<String> = first
                    .split_whitespace()
                    .filter_map(|part| part.chars().next())
                    .map(|c| format!("{}.", c))
                    .collect();
                format!("{}, {}", self.last_name, initials.join(" "))
            }
            None => self.last_name.clone(),
        }
    }
}

/// Annotation type as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationType {
    Highlight,
    Underline,
    Note,
    Text,
    Image,
    Ink,
}

impl AnnotationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Highlight => "highlight",
            Self::Underline => "underline",
            Self::Note => "note",
            Self::Text => "text",
            Self::Image => "image",
            Self::Ink => "ink",
        }
    }
}

/// Position of an annotation on its page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationPosition {
    pub page_index: u32,
    #[serde(default)]
    pub rects: Vec<[f64; 4]>,
}

/// Annotation-specific fields of an annotation item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationFields {
    pub annotation_type: AnnotationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<AnnotationPosition>,
}

/// Snapshot of a Zotero item as returned by the host.
///
/// The host's live item objects are not shared with this crate; an
/// [`ItemRepository`](crate::traits::ItemRepository) hands out snapshots
/// carrying just the fields needed for enrichment and validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryItem {
    #[serde(flatten)]
    pub item_ref: ItemRef,
    pub kind: ItemKind,
    /// Zotero item type, e.g. `"journalArticle"`, `"attachment"`, `"note"`.
    pub item_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub creators: Vec<Creator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Group ID when the item lives in a group library.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_content_type: Option<String>,
    /// Whether the attachment file exists locally.
    #[serde(default)]
    pub file_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<AnnotationFields>,
}

impl LibraryItem {
    /// Bare item of the given kind; fields are filled in with struct update
    /// syntax or the builder-style setters below.
    pub fn new(item_ref: ItemRef, kind: ItemKind, item_type: impl Into<String>) -> Self {
        Self {
            item_ref,
            kind,
            item_type: item_type.into(),
            parent_key: None,
            title: None,
            creators: Vec::new(),
            year: None,
            publication: None,
            doi: None,
            url: None,
            group_id: None,
            attachment_content_type: None,
            file_available: false,
            note_content: None,
            annotation: None,
        }
    }

    pub fn with_parent(mut self, parent_key: impl Into<String>) -> Self {
        self.parent_key = Some(parent_key.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn is_note(&self) -> bool {
        self.kind == ItemKind::Note
    }

    pub fn is_regular(&self) -> bool {
        self.kind == ItemKind::Regular
    }

    pub fn is_attachment(&self) -> bool {
        self.kind == ItemKind::Attachment
    }

    pub fn is_annotation(&self) -> bool {
        self.kind == ItemKind::Annotation
    }

    pub fn is_pdf_attachment(&self) -> bool {
        self.is_attachment()
            && self.attachment_content_type.as_deref() == Some(defaults::PDF_CONTENT_TYPE)
    }

    /// Reference to the parent item, if any.
    pub fn parent_ref(&self) -> Option<ItemRef> {
        self.parent_key
            .as_ref()
            .map(|key| self.item_ref.sibling(key.clone()))
    }

    /// Type icon identifier used by the sidebar.
    pub fn icon(&self) -> String {
        match self.kind {
            ItemKind::Note => "note".to_string(),
            ItemKind::Attachment if self.is_pdf_attachment() => "attachmentPDF".to_string(),
            ItemKind::Attachment => "attachmentFile".to_string(),
            ItemKind::Annotation => match &self.annotation {
                Some(a) => format!("annotate-{}", a.annotation_type.as_str()),
                None => "annotation".to_string(),
            },
            ItemKind::Regular => self.item_type.clone(),
        }
    }
}

// =============================================================================
// CITATIONS
// =============================================================================

/// Rectangle on a PDF page, in PDF points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

/// Where in the cited item a chunk was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationLocator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub boxes: Vec<BoundingBox>,
}

/// One retrieved chunk backing a citation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationPart {
    pub part_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locators: Vec<CitationLocator>,
}

/// Canonical citation record as received from the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationMetadata {
    pub citation_id: String,
    #[serde(flatten)]
    pub item: ItemRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
    /// Owning message; filled from the stream event when omitted.
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub parts: Vec<CitationPart>,
}

impl CitationMetadata {
    pub fn new(
        citation_id: impl Into<String>,
        item: ItemRef,
        message_id: impl Into<String>,
    ) -> Self {
        Self {
            citation_id: citation_id.into(),
            item,
            author_year: None,
            marker: None,
            message_id: message_id.into(),
            parts: Vec::new(),
        }
    }

    pub fn with_author_year(mut self, author_year: impl Into<String>) -> Self {
        self.author_year = Some(author_year.into());
        self
    }

    /// First page locator of the first part that has one.
    pub fn primary_page(&self) -> Option<u32> {
        self.parts
            .iter()
            .flat_map(|part| part.locators.iter())
            .find_map(|locator| locator.page)
    }
}

/// Display fields resolved from the host for a cited item.
///
/// All fields are optional: a citation whose item no longer resolves keeps
/// an enrichment with everything but the fallback label cleared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CitationEnrichment {
    #[serde(default)]
    pub parent_key: Option<String>,
    /// Key of the item the display fields were formatted from, when that is
    /// a parent of the cited item rather than the item itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cited_key: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Short in-text form, e.g. `"Smith et al. 2020"`.
    #[serde(default)]
    pub citation: Option<String>,
    /// Full bibliographic form.
    #[serde(default)]
    pub formatted_citation: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Cached preview image for image annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_image: Option<String>,
}

impl CitationEnrichment {
    /// Placeholder for an item that did not resolve: only the fallback label
    /// survives, in both `name` and `citation`.
    pub fn placeholder(label: Option<&str>) -> Self {
        Self {
            name: label.map(String::from),
            citation: label.map(String::from),
            ..Self::default()
        }
    }

    /// Whether these fields were derived from `changed`, either as the item
    /// itself (`item`) or as the parent it cites.
    pub fn derived_from(&self, item: &ItemRef, changed: &ItemRef) -> bool {
        item == changed
            || (item.library_id == changed.library_id
                && self.cited_key.as_deref() == Some(changed.zotero_key.as_str()))
    }
}

/// Citation enriched for display in a message footer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationData {
    #[serde(flatten)]
    pub metadata: CitationMetadata,
    #[serde(flatten)]
    pub enrichment: CitationEnrichment,
    /// 1-based position in the current resolution pass, as a label.
    pub numeric_citation: String,
    /// Set when the cited item could not be resolved; the UI styles these
    /// differently instead of hiding them.
    #[serde(default)]
    pub invalid: bool,
}

impl CitationData {
    pub fn citation_id(&self) -> &str {
        &self.metadata.citation_id
    }

    /// Label to show in running text: the short citation, else the
    /// backend's author-year label.
    pub fn display_label(&self) -> Option<&str> {
        self.enrichment
            .citation
            .as_deref()
            .or(self.metadata.author_year.as_deref())
    }
}

/// Distinct cited item for the "N sources" summary of a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCitation {
    #[serde(flatten)]
    pub item: ItemRef,
    #[serde(flatten)]
    pub enrichment: CitationEnrichment,
    pub numeric_citation: String,
    #[serde(default)]
    pub invalid: bool,
}
