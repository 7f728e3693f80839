//! End-to-end behavior of the citation pipeline against an in-memory library.
//!
//! Covers:
//! - Marker extraction on complete, repeated and truncated tags
//! - Numbering that follows input order regardless of lookup latency
//! - Concurrent lookups within one pass
//! - Degraded records for missing items
//! - Carry-forward of resolved citations across passes
//! - Idempotent source aggregation

use std::sync::Arc;
use std::time::Duration;

use beaver_citations::{
    extract_citation_ids, Aggregation, CitationCache, CitationMetadataStore, CitationResolver,
    MarkerScanner, SourceAggregator, SourceCache,
};
use beaver_core::{
    ChatMessage, CitationMetadata, Creator, InMemoryItemRepository, ItemKind, ItemRef,
    LibraryItem,
};

fn article(key: &str, author: &str, year: &str) -> LibraryItem {
    let mut item = LibraryItem::new(ItemRef::new(1, key), ItemKind::Regular, "journalArticle")
        .with_title(format!("On {}", key));
    item.creators = vec![Creator::new(author, Some("Pat"))];
    item.year = Some(year.to_string());
    item
}

fn library() -> InMemoryItemRepository {
    InMemoryItemRepository::from_items(vec![
        article("AAAA1111", "Smith", "2020"),
        article("BBBB2222", "Jones", "2021"),
        article("CCCC3333", "Lee", "2022"),
    ])
}

fn record(id: &str, key: &str) -> CitationMetadata {
    CitationMetadata::new(id, ItemRef::new(1, key), "m1")
}

fn assistant(id: &str, content: &str) -> ChatMessage {
    let mut message = ChatMessage::assistant(id);
    message.content = content.to_string();
    message
}

// ============================================================================
// MARKERS
// ============================================================================

#[test]
fn test_single_marker() {
    assert_eq!(
        extract_citation_ids(r#"The result <citation id="c1"/> supports this."#),
        vec!["c1"]
    );
}

#[test]
fn test_repeated_and_open_close_markers() {
    assert_eq!(
        extract_citation_ids(r#"<citation id="c1"/><citation id="c1"/><citation id="c2"></citation>"#),
        vec!["c1", "c2"]
    );
}

#[test]
fn test_truncated_trailing_marker() {
    assert!(extract_citation_ids(r#"...see <citation id="c3""#).is_empty());
    assert_eq!(
        extract_citation_ids(r#"<citation id="c1"/> and then see <citation id="c3""#),
        vec!["c1"]
    );
}

#[test]
fn test_scanner_over_streamed_snapshots() {
    let full = r#"A <citation id="c1"/> B <citation pages="3" id="c2"/> C <citation id="c1"/>"#;
    let mut scanner = MarkerScanner::new();
    let mut emitted = Vec::new();
    for end in (0..=full.len()).filter(|i| full.is_char_boundary(*i)) {
        emitted.extend(scanner.feed(&full[..end]).into_iter().map(|m| m.id));
    }
    assert_eq!(emitted, vec!["c1", "c2"]);
    assert_eq!(scanner.ids(), extract_citation_ids(full).as_slice());
}

// ============================================================================
// RESOLUTION
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_numbering_ignores_lookup_latency() {
    let repo = library()
        .with_latency(ItemRef::new(1, "AAAA1111"), Duration::from_millis(300))
        .with_latency(ItemRef::new(1, "BBBB2222"), Duration::from_millis(10))
        .with_latency(ItemRef::new(1, "CCCC3333"), Duration::from_millis(100));
    let resolver = CitationResolver::new(Arc::new(repo));

    let metadata = vec![
        record("a", "AAAA1111"),
        record("b", "BBBB2222"),
        record("c", "CCCC3333"),
    ];
    for _ in 0..2 {
        let out = resolver.resolve(&metadata, &[]).await;
        let order: Vec<(&str, &str)> = out
            .iter()
            .map(|c| (c.citation_id(), c.numeric_citation.as_str()))
            .collect();
        assert_eq!(order, vec![("a", "1"), ("b", "2"), ("c", "3")]);
    }
}

#[tokio::test(start_paused = true)]
async fn test_lookups_in_a_pass_run_concurrently() {
    let latency = Duration::from_millis(100);
    let repo = library()
        .with_latency(ItemRef::new(1, "AAAA1111"), latency)
        .with_latency(ItemRef::new(1, "BBBB2222"), latency)
        .with_latency(ItemRef::new(1, "CCCC3333"), latency);
    let repo = Arc::new(repo);
    let metadata = vec![
        record("a", "AAAA1111"),
        record("b", "BBBB2222"),
        record("c", "CCCC3333"),
    ];

    let started = tokio::time::Instant::now();
    let out = CitationResolver::new(repo.clone()).resolve(&metadata, &[]).await;
    assert_eq!(out.len(), 3);
    assert!(started.elapsed() < Duration::from_millis(200));

    let mut store = CitationMetadataStore::new();
    store.upsert(metadata);
    let messages = vec![assistant(
        "m1",
        r#"<citation id="a"/><citation id="b"/><citation id="c"/>"#,
    )];
    let started = tokio::time::Instant::now();
    let outcome = SourceAggregator::new(repo)
        .aggregate(&messages, &store, &[], &SourceCache::new())
        .await;
    assert!(matches!(outcome, Aggregation::Updated { ref sources, .. } if sources.len() == 3));
    assert!(started.elapsed() < Duration::from_millis(200));
}

#[tokio::test]
async fn test_missing_item_degrades_without_failing_batch() {
    let resolver = CitationResolver::new(Arc::new(library()));
    let metadata = vec![
        record("c1", "AAAA1111"),
        record("c2", "DELETED0").with_author_year("Gone 1999"),
        record("c3", "CCCC3333"),
    ];

    let out = resolver.resolve(&metadata, &[]).await;
    assert_eq!(out.len(), 3);

    let missing = &out[1];
    assert!(missing.invalid);
    assert!(missing.enrichment.url.is_none());
    assert!(missing.enrichment.formatted_citation.is_none());
    assert!(missing.enrichment.parent_key.is_none());
    assert_eq!(missing.metadata.author_year.as_deref(), Some("Gone 1999"));
    assert_eq!(missing.display_label(), Some("Gone 1999"));
    assert_eq!(missing.numeric_citation, "2");

    assert!(!out[0].invalid);
    assert!(!out[2].invalid);
}

#[tokio::test]
async fn test_carry_forward_skips_resolved_ids() {
    let repo = library();
    let resolver = CitationResolver::new(Arc::new(repo.clone()));
    let mut cache = CitationCache::new();

    let m1 = vec![record("c1", "AAAA1111"), record("c2", "BBBB2222")];
    let first = resolver.resolve_cached(&m1, &cache).await;
    first.commit(&mut cache);
    assert_eq!(repo.lookup_count(), 2);

    let mut extended = m1.clone();
    extended.push(record("c3", "CCCC3333"));
    let second = resolver.resolve_cached(&extended, &cache).await;

    assert_eq!(second.lookup_count, 1);
    assert_eq!(second.reused_count, 2);
    assert_eq!(repo.lookup_count_for(&ItemRef::new(1, "AAAA1111")), 1);
    assert_eq!(repo.lookup_count_for(&ItemRef::new(1, "BBBB2222")), 1);
    assert_eq!(repo.lookup_count_for(&ItemRef::new(1, "CCCC3333")), 1);
    assert_eq!(second.citations[0].enrichment, first.citations[0].enrichment);
    assert_eq!(second.citations[1].enrichment, first.citations[1].enrichment);
    assert_eq!(second.citations[2].numeric_citation, "3");
}

// ============================================================================
// AGGREGATION
// ============================================================================

#[tokio::test]
async fn test_aggregation_is_idempotent() {
    let repo = library();
    let aggregator = SourceAggregator::new(Arc::new(repo.clone()));

    let mut store = CitationMetadataStore::new();
    store.upsert(vec![record("c1", "AAAA1111"), record("c2", "DELETED0")]);
    let messages = vec![
        assistant("m1", r#"First <citation id="c1"/>."#),
        assistant("m2", r#"Second <citation id="c2"/> and <citation id="1-BBBB2222"/>."#),
    ];

    let mut cache = SourceCache::new();
    let sources = aggregator
        .aggregate(&messages, &store, &[], &cache)
        .await
        .commit(&mut cache)
        .expect("first pass builds the list");
    let keys: Vec<&str> = sources.iter().map(|s| s.item.zotero_key.as_str()).collect();
    assert_eq!(keys, vec!["AAAA1111", "BBBB2222"]);
    assert_eq!(sources[0].numeric_citation, "1");
    assert_eq!(sources[1].numeric_citation, "2");

    let lookups = repo.lookup_count();
    let again = aggregator.aggregate(&messages, &store, &sources, &cache).await;
    assert_eq!(again, Aggregation::Unchanged);
    assert_eq!(repo.lookup_count(), lookups);
}

#[tokio::test]
async fn test_aggregation_looks_up_only_new_items() {
    let repo = library();
    let aggregator = SourceAggregator::new(Arc::new(repo.clone()));
    let store = CitationMetadataStore::new();

    let mut messages = vec![assistant("m1", r#"<citation id="1-AAAA1111"/>"#)];
    let mut cache = SourceCache::new();
    let first = aggregator
        .aggregate(&messages, &store, &[], &cache)
        .await
        .commit(&mut cache)
        .unwrap();

    messages.push(assistant("m2", r#"<citation id="1-CCCC3333"/><citation id="1-AAAA1111"/>"#));
    let second = aggregator
        .aggregate(&messages, &store, &first, &cache)
        .await
        .commit(&mut cache)
        .unwrap();

    assert_eq!(second.len(), 2);
    assert_eq!(second[0], first[0]);
    assert_eq!(second[1].item.zotero_key, "CCCC3333");
    assert_eq!(repo.lookup_count_for(&ItemRef::new(1, "AAAA1111")), 1);
}
