//! Display formatting for cited items: in-text and bibliographic citations,
//! note titles, annotation labels, and `zotero://` links.

use once_cell::sync::Lazy;
use regex::Regex;

use beaver_core::defaults::{ANNOTATION_NAME_MAX_CHARS, NOTE_TITLE_MAX_CHARS, UNTITLED_NOTE};
use beaver_core::{AnnotationType, Creator, LibraryItem};

static BLOCK_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)</?(?:p|div|h[1-6]|li|ul|ol|blockquote|pre|br)\b[^>]*>")
        .expect("block tag pattern is valid")
});

static ANY_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"));

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Truncate to `max` characters, appending an ellipsis when shortened.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", kept.trim_end())
}

fn author_names(creators: &[Creator]) -> Option<String> {
    match creators {
        [] => None,
        [only] => Some(only.last_name.clone()),
        [first, second] => Some(format!("{} and {}", first.last_name, second.last_name)),
        [first, ..] => Some(format!("{} et al.", first.last_name)),
    }
}

/// Title of a note: first non-empty line of its content, HTML removed.
pub fn note_title(content: &str) -> String {
    let with_breaks = BLOCK_TAG.replace_all(content, "\n");
    let text = ANY_TAG.replace_all(&with_breaks, "");
    text.lines()
        .map(|line| WHITESPACE.replace_all(line.trim(), " ").into_owned())
        .find(|line| !line.is_empty())
        .map(|line| truncate_chars(&line, NOTE_TITLE_MAX_CHARS))
        .unwrap_or_else(|| UNTITLED_NOTE.to_string())
}

/// Short in-text citation, e.g. `"Smith et al. 2020"`.
///
/// Falls back to the title when the item has no creators.
pub fn short_citation(item: &LibraryItem) -> Option<String> {
    if item.is_note() {
        return Some(note_title(item.note_content.as_deref().unwrap_or_default()));
    }
    let year = item.year.as_deref().filter(|y| !y.is_empty());
    match (author_names(&item.creators), year) {
        (Some(names), Some(year)) => Some(format!("{} {}", names, year)),
        (Some(names), None) => Some(names),
        (None, _) => item.title.clone(),
    }
}

/// Full bibliographic citation in an author-date style:
/// `Smith, J., & Jones, K. (2020). Title. Publication. https://doi.org/...`
pub fn full_citation(item: &LibraryItem) -> Option<String> {
    if item.is_note() {
        return Some(note_title(item.note_content.as_deref().unwrap_or_default()));
    }
    if item.creators.is_empty() && item.title.is_none() {
        return None;
    }

    let mut segments = Vec::new();

    let names: Vec<String> = item.creators.iter().map(Creator::with_initials).collect();
    let authors = match names.as_slice() {
        [] => None,
        [only] => Some(only.clone()),
        [init @ .., last] => Some(format!("{}, & {}", init.join(", "), last)),
    };
    let year = item
        .year
        .as_deref()
        .filter(|y| !y.is_empty())
        .unwrap_or("n.d.");
    match authors {
        Some(authors) => segments.push(format!("{} ({}).", authors, year)),
        None => segments.push(format!("({}).", year)),
    }

    if let Some(title) = item.title.as_deref().filter(|t| !t.is_empty()) {
        segments.push(format!("{}.", title.trim_end_matches('.')));
    }
    if let Some(publication) = item.publication.as_deref().filter(|p| !p.is_empty()) {
        segments.push(format!("{}.", publication.trim_end_matches('.')));
    }
    if let Some(doi) = item.doi.as_deref().filter(|d| !d.is_empty()) {
        segments.push(format!("https://doi.org/{}", doi));
    } else if let Some(url) = item.url.as_deref().filter(|u| !u.is_empty()) {
        segments.push(url.to_string());
    }

    Some(segments.join(" "))
}

/// Label for an annotation: its quoted text or comment plus page label.
pub fn annotation_name(item: &LibraryItem) -> String {
    let Some(annotation) = item.annotation.as_ref() else {
        return "Annotation".to_string();
    };

    let body = match annotation.annotation_type {
        AnnotationType::Image => Some("Image".to_string()),
        AnnotationType::Ink => Some("Drawing".to_string()),
        _ => annotation
            .text
            .as_deref()
            .or(annotation.comment.as_deref())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| format!("\u{201c}{}\u{201d}", truncate_chars(t, ANNOTATION_NAME_MAX_CHARS))),
    }
    .unwrap_or_else(|| "Annotation".to_string());

    match annotation.page_label.as_deref().filter(|p| !p.is_empty()) {
        Some(page) => format!("{} (p. {})", body, page),
        None => body,
    }
}

/// Human-readable name for a cited item.
pub fn display_name(item: &LibraryItem) -> Option<String> {
    if item.is_annotation() {
        return Some(annotation_name(item));
    }
    short_citation(item).or_else(|| item.title.clone())
}

fn library_segment(item: &LibraryItem, user_library_id: i64) -> String {
    match item.group_id {
        Some(group_id) if item.item_ref.library_id != user_library_id => {
            format!("groups/{}", group_id)
        }
        _ => "library".to_string(),
    }
}

/// `zotero://` link opening the item: PDFs and annotations open in the
/// reader (at `page` when known), everything else is selected in the library.
pub fn item_uri(item: &LibraryItem, page: Option<u32>, user_library_id: i64) -> String {
    let library = library_segment(item, user_library_id);
    let key = &item.item_ref.zotero_key;

    if item.is_pdf_attachment() {
        return match page {
            Some(page) => format!("zotero://open-pdf/{}/items/{}?page={}", library, key, page),
            None => format!("zotero://open-pdf/{}/items/{}", library, key),
        };
    }
    if item.is_annotation() {
        if let Some(parent) = item.parent_key.as_deref() {
            return format!(
                "zotero://open-pdf/{}/items/{}?annotation={}",
                library, parent, key
            );
        }
    }
    format!("zotero://select/{}/items/{}", library, key)
}
