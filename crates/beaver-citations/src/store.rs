//! Citation metadata store.
//!
//! Holds the canonical citation records received from the backend for the
//! active thread, keyed by `citation_id` and kept in insertion order. There
//! is no delete: the store only grows until the thread is switched, at which
//! point the owning session drops it.

use std::collections::HashMap;

use beaver_core::{CitationMetadata, ItemRef};

use crate::merge::Merge;

/// Counts from one [`CitationMetadataStore::upsert`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
}

impl UpsertSummary {
    pub fn changed(&self) -> bool {
        self.inserted + self.updated > 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct CitationMetadataStore {
    records: Vec<CitationMetadata>,
    index: HashMap<String, usize>,
}

impl CitationMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge new or updated records by `citation_id`; later writes win.
    ///
    /// An updated record keeps its original position.
    pub fn upsert(&mut self, records: impl IntoIterator<Item = CitationMetadata>) -> UpsertSummary {
        let mut summary = UpsertSummary::default();

        for record in records {
            match self.index.get(&record.citation_id) {
                Some(&position) => {
                    let existing = &mut self.records[position];
                    let merged = existing.clone().merge(record);
                    if *existing != merged {
                        *existing = merged;
                        summary.updated += 1;
                    }
                }
                None => {
                    self.index
                        .insert(record.citation_id.clone(), self.records.len());
                    self.records.push(record);
                    summary.inserted += 1;
                }
            }
        }

        summary
    }

    /// All records in insertion order.
    pub fn get_all(&self) -> &[CitationMetadata] {
        &self.records
    }

    pub fn get(&self, citation_id: &str) -> Option<&CitationMetadata> {
        self.index.get(citation_id).map(|&i| &self.records[i])
    }

    /// Item referenced by a citation ID, if the backend has described it.
    pub fn item_for(&self, citation_id: &str) -> Option<&ItemRef> {
        self.get(citation_id).map(|record| &record.item)
    }

    pub fn for_message<'a>(
        &'a self,
        message_id: &'a str,
    ) -> impl Iterator<Item = &'a CitationMetadata> + 'a {
        self.records
            .iter()
            .filter(move |record| record.message_id == message_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, key: &str, message: &str) -> CitationMetadata {
        CitationMetadata::new(id, ItemRef::new(1, key), message)
    }

    #[test]
    fn test_upsert_inserts_in_order() {
        let mut store = CitationMetadataStore::new();
        let summary = store.upsert(vec![record("c2", "B", "m1"), record("c1", "A", "m1")]);

        assert_eq!(summary, UpsertSummary { inserted: 2, updated: 0 });
        let ids: Vec<&str> = store.get_all().iter().map(|r| r.citation_id.as_str()).collect();
        assert_eq!(ids, vec!["c2", "c1"]);
    }

    #[test]
    fn test_upsert_replaces_by_id_in_place() {
        let mut store = CitationMetadataStore::new();
        store.upsert(vec![record("c1", "A", "m1"), record("c2", "B", "m1")]);

        let summary = store.upsert(vec![record("c1", "A", "m1").with_author_year("Smith 2020")]);
        assert_eq!(summary, UpsertSummary { inserted: 0, updated: 1 });
        assert_eq!(store.len(), 2);
        assert_eq!(store.get_all()[0].author_year.as_deref(), Some("Smith 2020"));
    }

    #[test]
    fn test_identical_upsert_is_not_a_change() {
        let mut store = CitationMetadataStore::new();
        store.upsert(vec![record("c1", "A", "m1")]);
        let summary = store.upsert(vec![record("c1", "A", "m1")]);
        assert!(!summary.changed());
    }

    #[test]
    fn test_lookup_helpers() {
        let mut store = CitationMetadataStore::new();
        store.upsert(vec![
            record("c1", "A", "m1"),
            record("c2", "B", "m2"),
            record("c3", "C", "m2"),
        ]);

        assert_eq!(store.item_for("c2"), Some(&ItemRef::new(1, "B")));
        assert!(store.item_for("missing").is_none());
        assert_eq!(store.for_message("m2").count(), 2);
        assert!(!store.is_empty());
    }
}
