//! Field-level merging of partial record updates.
//!
//! Precedence: fields present in the update override the existing value,
//! absent fields (`None`, empty lists, empty strings for required IDs) keep
//! the existing value.

use beaver_core::{CitationEnrichment, CitationMetadata};

/// Merge a newer version of a record into an existing one.
pub trait Merge {
    fn merge(self, update: Self) -> Self;
}

fn keep_if_empty(old: String, new: String) -> String {
    if new.is_empty() {
        old
    } else {
        new
    }
}

impl Merge for CitationMetadata {
    fn merge(self, update: Self) -> Self {
        Self {
            citation_id: keep_if_empty(self.citation_id, update.citation_id),
            item: update.item,
            author_year: update.author_year.or(self.author_year),
            marker: update.marker.or(self.marker),
            message_id: keep_if_empty(self.message_id, update.message_id),
            parts: if update.parts.is_empty() {
                self.parts
            } else {
                update.parts
            },
        }
    }
}

impl Merge for CitationEnrichment {
    fn merge(self, update: Self) -> Self {
        Self {
            parent_key: update.parent_key.or(self.parent_key),
            cited_key: update.cited_key.or(self.cited_key),
            icon: update.icon.or(self.icon),
            name: update.name.or(self.name),
            citation: update.citation.or(self.citation),
            formatted_citation: update.formatted_citation.or(self.formatted_citation),
            url: update.url.or(self.url),
            preview_image: update.preview_image.or(self.preview_image),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beaver_core::{CitationPart, ItemRef};

    #[test]
    fn test_metadata_update_overrides_present_fields() {
        let old = CitationMetadata::new("c1", ItemRef::new(1, "A"), "m1").with_author_year("Old 1999");
        let mut update = CitationMetadata::new("c1", ItemRef::new(1, "A"), "m1");
        update.author_year = Some("New 2020".to_string());

        let merged = old.merge(update);
        assert_eq!(merged.author_year.as_deref(), Some("New 2020"));
    }

    #[test]
    fn test_metadata_absent_fields_preserve_old() {
        let mut old = CitationMetadata::new("c1", ItemRef::new(1, "A"), "m1").with_author_year("Smith 2020");
        old.marker = Some("1".to_string());
        old.parts = vec![CitationPart {
            part_id: "p1".to_string(),
            locators: vec![],
        }];
        let update = CitationMetadata::new("c1", ItemRef::new(1, "A"), "");

        let merged = old.merge(update);
        assert_eq!(merged.author_year.as_deref(), Some("Smith 2020"));
        assert_eq!(merged.marker.as_deref(), Some("1"));
        assert_eq!(merged.message_id, "m1");
        assert_eq!(merged.parts.len(), 1);
    }

    #[test]
    fn test_enrichment_merge_over_placeholder() {
        let placeholder = CitationEnrichment::placeholder(Some("Smith 2020"));
        let resolved = CitationEnrichment {
            citation: Some("Smith et al. 2020".to_string()),
            url: Some("zotero://select/library/items/A".to_string()),
            ..CitationEnrichment::default()
        };

        let merged = placeholder.merge(resolved);
        assert_eq!(merged.citation.as_deref(), Some("Smith et al. 2020"));
        assert_eq!(merged.name.as_deref(), Some("Smith 2020"));
        assert!(merged.url.is_some());
    }
}
