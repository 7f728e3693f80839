//! Inline citation marker parsing.
//!
//! Assistant text references sources with tags of the form
//! `<citation id="ID" pages="..." consecutive="true"/>` or the open/close
//! variant `<citation id="ID">...</citation>`. Attribute order does not
//! matter and `id` is the only required attribute.
//!
//! Buffers are usually snapshots of a message that is still streaming, so
//! the last tag may be cut off mid-way. A tag only counts once its closing
//! `>` (or `/>`) has arrived; anything before that is ignored without
//! complaint.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::ops::Range;
use tracing::trace;

static CITATION_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<citation\b([^<>]*?)/?>").expect("citation tag pattern is valid")
});

static CLOSING_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</citation\s*>").expect("closing tag pattern is valid"));

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_][\w-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("attribute pattern is valid")
});

/// A complete citation tag found in a text buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationMarker {
    pub id: String,
    pub pages: Option<String>,
    pub consecutive: bool,
    /// Byte range of the tag within the scanned buffer.
    pub span: Range<usize>,
}

/// Every complete citation marker in `text`, in order, including repeats.
///
/// Tags without a non-empty `id` are skipped.
pub fn parse_citation_markers(text: &str) -> Vec<CitationMarker> {
    parse_from(text, 0)
}

/// Citation IDs referenced in `text`, deduplicated in first-seen order.
///
/// # Examples
///
/// ```
/// use beaver_citations::extract_citation_ids;
///
/// let text = r#"<citation id="c1"/><citation id="c1"/><citation id="c2"></citation>"#;
/// assert_eq!(extract_citation_ids(text), vec!["c1", "c2"]);
///
/// // Truncated tail from a streaming buffer
/// assert!(extract_citation_ids(r#"...see <citation id="c3""#).is_empty());
/// ```
pub fn extract_citation_ids(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    parse_citation_markers(text)
        .into_iter()
        .filter(|marker| seen.insert(marker.id.clone()))
        .map(|marker| marker.id)
        .collect()
}

/// Remove complete citation tags (and their closing tags) from `text`,
/// keeping any text wrapped by the open/close variant.
pub fn strip_citation_markers(text: &str) -> String {
    let without_open = CITATION_TAG.replace_all(text, "");
    CLOSING_TAG.replace_all(&without_open, "").into_owned()
}

fn parse_from(text: &str, offset: usize) -> Vec<CitationMarker> {
    CITATION_TAG
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let attributes = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let span = (offset + whole.start())..(offset + whole.end());
            let marker = marker_from_attributes(attributes, span);
            if marker.is_none() {
                trace!(tag = whole.as_str(), "Skipping citation tag without id");
            }
            marker
        })
        .collect()
}

fn marker_from_attributes(attributes: &str, span: Range<usize>) -> Option<CitationMarker> {
    let mut id = None;
    let mut pages = None;
    let mut consecutive = false;

    for caps in ATTRIBUTE.captures_iter(attributes) {
        let name = &caps[1];
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map(|m| m.as_str())
            .unwrap_or_default();
        match name {
            "id" => id = Some(value.trim().to_string()),
            "pages" => pages = Some(value.to_string()),
            "consecutive" => consecutive = value == "true",
            _ => {}
        }
    }

    let id = id.filter(|id| !id.is_empty())?;
    Some(CitationMarker {
        id,
        pages,
        consecutive,
        span,
    })
}

/// Incremental scanner over successive snapshots of a growing buffer.
///
/// Each call to [`feed`](Self::feed) resumes after the last complete tag of
/// the previous snapshot, so text that was already settled is not scanned
/// again. A snapshot that does not extend the previous one (the buffer was
/// replaced) restarts the scan from scratch.
#[derive(Debug, Default, Clone)]
pub struct MarkerScanner {
    /// Prefix of the buffer up to the end of the last complete tag.
    settled: String,
    seen: HashSet<String>,
    ids: Vec<String>,
}

impl MarkerScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan a new snapshot and return markers whose IDs were not seen before.
    pub fn feed(&mut self, buffer: &str) -> Vec<CitationMarker> {
        if !buffer.starts_with(self.settled.as_str()) {
            trace!("Buffer no longer extends scanned prefix, rescanning");
            self.reset();
        }

        let offset = self.settled.len();
        let markers = parse_from(&buffer[offset..], offset);

        if let Some(last) = markers.last() {
            self.settled.push_str(&buffer[offset..last.span.end]);
        }

        markers
            .into_iter()
            .filter(|marker| {
                let new = self.seen.insert(marker.id.clone());
                if new {
                    self.ids.push(marker.id.clone());
                }
                new
            })
            .collect()
    }

    /// All IDs seen so far, in first-seen order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn reset(&mut self) {
        self.settled.clear();
        self.seen.clear();
        self.ids.clear();
    }
}
