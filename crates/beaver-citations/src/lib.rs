//! # beaver-citations
//!
//! Citation reconciliation for Beaver chat threads.
//!
//! Assistant messages stream in with inline `<citation .../>` markers; the
//! backend separately delivers [`CitationMetadata`](beaver_core::CitationMetadata)
//! for each citation. This crate ties the two to the Zotero library:
//!
//! - [`markers`]: extract citation IDs from (partially streamed) text
//! - [`store`]: append-only metadata store keyed by citation ID
//! - [`resolver`]: enrich metadata into display records, degrading on missing items
//! - [`aggregate`]: deduplicated "N sources" list across a thread
//! - [`cache`]: carry-forward cache so each item is looked up once per thread

pub mod aggregate;
pub mod cache;
pub mod enrich;
pub mod format;
pub mod markers;
pub mod merge;
pub mod resolver;
pub mod store;

pub use aggregate::{collect_cited_ids, Aggregation, MissingSourcePolicy, SourceAggregator, SourceCache};
pub use cache::{ReconcilePlan, ReconciliationCache};
pub use enrich::ItemEnricher;
pub use markers::{
    extract_citation_ids, parse_citation_markers, strip_citation_markers, CitationMarker,
    MarkerScanner,
};
pub use merge::Merge;
pub use resolver::{CitationCache, CitationResolver, Resolution};
pub use store::{CitationMetadataStore, UpsertSummary};
