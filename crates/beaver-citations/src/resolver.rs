//! Citation resolution engine.
//!
//! Turns backend [`CitationMetadata`] into display-ready [`CitationData`].
//! Each pass reuses enrichment already computed for a citation ID (as long
//! as it still points at the same item) and looks up only the rest, so the
//! host is queried at most once per citation within a thread session.
//!
//! Resolution never fails as a whole: an item that is gone, or whose lookup
//! raised an error, yields a placeholder record carrying the author-year
//! label and `invalid = true`.

use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, debug_span, field, warn, Instrument};

use beaver_core::defaults;
use beaver_core::logging;
use beaver_core::{CitationData, CitationEnrichment, CitationMetadata, ItemRepository};

use crate::cache::ReconciliationCache;
use crate::enrich::ItemEnricher;
use crate::merge::Merge;

/// Resolved citations keyed by `citation_id`.
pub type CitationCache = ReconciliationCache<String, CitationData>;

/// Output of one resolution pass.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Same length and order as the input metadata.
    pub citations: Vec<CitationData>,
    pub lookup_count: usize,
    pub reused_count: usize,
    pub missing_count: usize,
}

impl Resolution {
    /// Record this pass in `cache` so later passes can carry it forward.
    pub fn commit(&self, cache: &mut CitationCache) {
        cache.extend(
            self.citations
                .iter()
                .map(|citation| (citation.citation_id().to_string(), citation.clone())),
        );
    }
}

#[derive(Clone)]
pub struct CitationResolver {
    enricher: ItemEnricher,
    concurrency: usize,
}

impl CitationResolver {
    pub fn new(repo: Arc<dyn ItemRepository>) -> Self {
        Self {
            enricher: ItemEnricher::new(repo, defaults::USER_LIBRARY_ID),
            concurrency: defaults::LOOKUP_CONCURRENCY,
        }
    }

    /// Maximum lookups in flight at once; at least one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_user_library_id(mut self, user_library_id: i64) -> Self {
        self.enricher = ItemEnricher::new(self.enricher.repository().clone(), user_library_id);
        self
    }

    /// Resolve `metadata`, carrying forward anything in `previous`.
    pub async fn resolve(
        &self,
        metadata: &[CitationMetadata],
        previous: &[CitationData],
    ) -> Vec<CitationData> {
        let cache = CitationCache::from_entries(
            previous
                .iter()
                .map(|citation| (citation.citation_id().to_string(), citation.clone())),
        );
        self.resolve_cached(metadata, &cache).await.citations
    }

    /// Resolve `metadata` against a reconciliation cache without modifying
    /// it; call [`Resolution::commit`] to keep the results.
    ///
    /// Lookups run concurrently, but results are collected in input order
    /// before numbering, so `numeric_citation` follows the order of
    /// `metadata` regardless of lookup latency.
    pub async fn resolve_cached(
        &self,
        metadata: &[CitationMetadata],
        cache: &CitationCache,
    ) -> Resolution {
        let started = Instant::now();
        let span = debug_span!(
            "resolve_citations",
            subsystem = "citations",
            component = "resolver",
            result_count = field::Empty,
            lookup_count = field::Empty,
            reused_count = field::Empty,
            missing_count = field::Empty,
            duration_ms = field::Empty,
        );

        let pending: Vec<&CitationMetadata> = metadata
            .iter()
            .filter(|record| reusable(cache, record).is_none())
            .collect();

        let fresh: Vec<(CitationEnrichment, bool)> = stream::iter(
            pending.iter().map(|record| self.enrich_record(record)),
        )
        .buffered(self.concurrency)
        .collect::<Vec<_>>()
        .instrument(span.clone())
        .await;

        let fresh_by_id: HashMap<&str, (CitationEnrichment, bool)> = pending
            .iter()
            .map(|record| record.citation_id.as_str())
            .zip(fresh)
            .collect();

        let citations: Vec<CitationData> = metadata
            .iter()
            .enumerate()
            .map(|(index, record)| {
                let (merged, enrichment, invalid) = match reusable(cache, record) {
                    Some(previous) => (
                        previous.metadata.clone().merge(record.clone()),
                        previous.enrichment.clone(),
                        previous.invalid,
                    ),
                    None => {
                        let (enrichment, invalid) = fresh_by_id
                            .get(record.citation_id.as_str())
                            .cloned()
                            .unwrap_or_else(|| {
                                (
                                    CitationEnrichment::placeholder(record.author_year.as_deref()),
                                    true,
                                )
                            });
                        (record.clone(), enrichment, invalid)
                    }
                };
                CitationData {
                    metadata: merged,
                    enrichment,
                    numeric_citation: (index + 1).to_string(),
                    invalid,
                }
            })
            .collect();

        let resolution = Resolution {
            lookup_count: pending.len(),
            reused_count: metadata.len() - pending.len(),
            missing_count: citations.iter().filter(|c| c.invalid).count(),
            citations,
        };

        span.record(logging::RESULT_COUNT, resolution.citations.len());
        span.record(logging::LOOKUP_COUNT, resolution.lookup_count);
        span.record(logging::REUSED_COUNT, resolution.reused_count);
        span.record(logging::MISSING_COUNT, resolution.missing_count);
        span.record(logging::DURATION_MS, started.elapsed().as_millis() as u64);
        span.in_scope(|| debug!("Citation resolution pass complete"));

        resolution
    }

    async fn enrich_record(&self, record: &CitationMetadata) -> (CitationEnrichment, bool) {
        let fallback = CitationEnrichment::placeholder(record.author_year.as_deref());

        match self
            .enricher
            .enrich(&record.item, record.primary_page())
            .await
        {
            Ok(Some(enrichment)) => (fallback.merge(enrichment), false),
            Ok(None) => {
                debug!(
                    citation_id = %record.citation_id,
                    library_id = record.item.library_id,
                    item_key = %record.item.zotero_key,
                    "Cited item not found, using placeholder"
                );
                (fallback, true)
            }
            Err(e) if e.is_not_found() => {
                debug!(
                    citation_id = %record.citation_id,
                    error = %e,
                    "Cited item not found, using placeholder"
                );
                (fallback, true)
            }
            Err(e) => {
                warn!(
                    citation_id = %record.citation_id,
                    library_id = record.item.library_id,
                    item_key = %record.item.zotero_key,
                    error = %e,
                    "Item lookup failed, using placeholder"
                );
                (fallback, true)
            }
        }
    }
}

/// Cached result for `record`, if it still refers to the same item.
fn reusable<'c>(cache: &'c CitationCache, record: &CitationMetadata) -> Option<&'c CitationData> {
    cache
        .get(&record.citation_id)
        .filter(|previous| previous.metadata.item == record.item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use beaver_core::{Creator, InMemoryItemRepository, ItemKind, ItemRef, LibraryItem};

    fn article(key: &str, author: &str, year: &str) -> LibraryItem {
        let mut item = LibraryItem::new(ItemRef::new(1, key), ItemKind::Regular, "journalArticle")
            .with_title(format!("Paper {}", key));
        item.creators = vec![Creator::new(author, None)];
        item.year = Some(year.to_string());
        item
    }

    fn record(id: &str, key: &str) -> CitationMetadata {
        CitationMetadata::new(id, ItemRef::new(1, key), "m1")
    }

    #[tokio::test]
    async fn test_resolve_numbers_in_input_order() {
        let repo = InMemoryItemRepository::from_items(vec![
            article("A", "Smith", "2020"),
            article("B", "Jones", "2021"),
        ]);
        let resolver = CitationResolver::new(Arc::new(repo));

        let out = resolver
            .resolve(&[record("c2", "B"), record("c1", "A")], &[])
            .await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].citation_id(), "c2");
        assert_eq!(out[0].numeric_citation, "1");
        assert_eq!(out[0].enrichment.citation.as_deref(), Some("Jones 2021"));
        assert_eq!(out[1].numeric_citation, "2");
        assert!(!out[1].invalid);
    }

    #[tokio::test]
    async fn test_reuse_requires_same_item() {
        let repo = InMemoryItemRepository::from_items(vec![
            article("A", "Smith", "2020"),
            article("B", "Jones", "2021"),
        ]);
        let resolver = CitationResolver::new(Arc::new(repo.clone()));

        let first = resolver.resolve(&[record("c1", "A")], &[]).await;
        assert_eq!(repo.lookup_count_for(&ItemRef::new(1, "A")), 1);

        let second = resolver.resolve(&[record("c1", "B")], &first).await;
        assert_eq!(repo.lookup_count_for(&ItemRef::new(1, "B")), 1);
        assert_eq!(second[0].enrichment.citation.as_deref(), Some("Jones 2021"));
    }

    #[tokio::test]
    async fn test_reused_record_takes_updated_metadata() {
        let repo = InMemoryItemRepository::from_items(vec![article("A", "Smith", "2020")]);
        let resolver = CitationResolver::new(Arc::new(repo.clone()));

        let first = resolver.resolve(&[record("c1", "A")], &[]).await;
        let updated = record("c1", "A").with_author_year("Smith 2020");
        let second = resolver.resolve(&[updated], &first).await;

        assert_eq!(repo.lookup_count(), 1);
        assert_eq!(second[0].metadata.author_year.as_deref(), Some("Smith 2020"));
        assert_eq!(second[0].enrichment, first[0].enrichment);
    }

    #[tokio::test]
    async fn test_host_failure_degrades() {
        let repo = InMemoryItemRepository::from_items(vec![article("A", "Smith", "2020")])
            .with_failure(ItemRef::new(1, "A"));
        let resolver = CitationResolver::new(Arc::new(repo));

        let out = resolver
            .resolve(&[record("c1", "A").with_author_year("Smith 2020")], &[])
            .await;
        assert!(out[0].invalid);
        assert_eq!(out[0].enrichment.citation.as_deref(), Some("Smith 2020"));
        assert!(out[0].enrichment.url.is_none());
    }

    #[tokio::test]
    async fn test_resolution_counts_and_commit() {
        let repo = InMemoryItemRepository::from_items(vec![article("A", "Smith", "2020")]);
        let resolver = CitationResolver::new(Arc::new(repo)).with_concurrency(0);

        let mut cache = CitationCache::new();
        let first = resolver.resolve_cached(&[record("c1", "A"), record("c2", "GONE")], &cache).await;
        assert_eq!(first.lookup_count, 2);
        assert_eq!(first.missing_count, 1);
        first.commit(&mut cache);
        assert_eq!(cache.len(), 2);

        let second = resolver.resolve_cached(&[record("c1", "A"), record("c2", "GONE")], &cache).await;
        assert_eq!(second.lookup_count, 0);
        assert_eq!(second.reused_count, 2);
        assert!(second.citations[1].invalid);
    }
}
