//! Source aggregation for the "N sources" summary of a thread.
//!
//! Collects every item cited anywhere in the thread's assistant messages,
//! deduplicated by (library, key) and numbered in first-seen order. This is
//! a best-effort list: by default items that do not resolve are left out
//! rather than shown as placeholders (see [`MissingSourcePolicy`]).

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, debug_span, field, trace, warn, Instrument};

use beaver_core::defaults;
use beaver_core::logging;
use beaver_core::{
    ChatMessage, CitationEnrichment, Error, ItemRef, ItemRepository, Result, SourceCitation,
};

use crate::cache::ReconciliationCache;
use crate::enrich::ItemEnricher;
use crate::markers::extract_citation_ids;
use crate::store::CitationMetadataStore;

/// Enrichment per item; `None` records an item known not to resolve.
pub type SourceCache = ReconciliationCache<ItemRef, Option<CitationEnrichment>>;

/// What to show for a cited item that does not resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingSourcePolicy {
    /// Leave it out of the list.
    #[default]
    Drop,
    /// Keep an invalid entry labeled with the author-year or item reference.
    Placeholder,
}

/// Result of an aggregation pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregation {
    /// Every referenced item is already listed; nothing to do.
    Unchanged,
    Updated {
        sources: Vec<SourceCitation>,
        /// Newly looked-up items, to be committed to the [`SourceCache`].
        fresh: Vec<(ItemRef, Option<CitationEnrichment>)>,
    },
}

impl FromStr for MissingSourcePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "drop" => Ok(Self::Drop),
            "placeholder" => Ok(Self::Placeholder),
            other => Err(Error::InvalidInput(format!(
                "unknown missing source policy: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for MissingSourcePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drop => write!(f, "drop"),
            Self::Placeholder => write!(f, "placeholder"),
        }
    }
}

impl Aggregation {
    /// Commit fresh lookups to `cache` and return the new list, if any.
    pub fn commit(self, cache: &mut SourceCache) -> Option<Vec<SourceCitation>> {
        match self {
            Aggregation::Unchanged => None,
            Aggregation::Updated { sources, fresh } => {
                cache.extend(fresh);
                Some(sources)
            }
        }
    }
}

/// Citation IDs across all assistant messages (answer and reasoning text),
/// deduplicated in first-seen order.
pub fn collect_cited_ids(messages: &[ChatMessage]) -> Vec<String> {
    let mut seen = HashSet::new();
    messages
        .iter()
        .filter(|message| message.is_assistant())
        .flat_map(|message| message.citable_texts())
        .flat_map(extract_citation_ids)
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

#[derive(Clone)]
pub struct SourceAggregator {
    enricher: ItemEnricher,
    concurrency: usize,
    policy: MissingSourcePolicy,
}

impl SourceAggregator {
    pub fn new(repo: Arc<dyn ItemRepository>) -> Self {
        Self {
            enricher: ItemEnricher::new(repo, defaults::USER_LIBRARY_ID),
            concurrency: defaults::LOOKUP_CONCURRENCY,
            policy: MissingSourcePolicy::default(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_user_library_id(mut self, user_library_id: i64) -> Self {
        self.enricher = ItemEnricher::new(self.enricher.repository().clone(), user_library_id);
        self
    }

    pub fn with_policy(mut self, policy: MissingSourcePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> MissingSourcePolicy {
        self.policy
    }

    /// Rebuild the cited-source list for `messages`.
    ///
    /// Citation IDs map to items through `store`; IDs the backend has not
    /// described yet are accepted when they are item references themselves
    /// (`"1-ABCD1234"`) and skipped otherwise. Returns
    /// [`Aggregation::Unchanged`] when every referenced item is already in
    /// `existing` or known to be missing, without any host lookups.
    pub async fn aggregate(
        &self,
        messages: &[ChatMessage],
        store: &CitationMetadataStore,
        existing: &[SourceCitation],
        cache: &SourceCache,
    ) -> Aggregation {
        let started = Instant::now();
        let ids = collect_cited_ids(messages);

        let mut labels: HashMap<ItemRef, String> = HashMap::new();
        let refs: Vec<ItemRef> = ids
            .iter()
            .filter_map(|id| {
                let (item, label) = match store.get(id) {
                    Some(record) => (record.item.clone(), record.author_year.clone()),
                    None => match id.parse::<ItemRef>() {
                        Ok(item) => (item, None),
                        Err(_) => {
                            trace!(citation_id = %id, "Citation not yet described, skipping");
                            return None;
                        }
                    },
                };
                if let Some(label) = label {
                    labels.entry(item.clone()).or_insert(label);
                }
                Some(item)
            })
            .collect();

        let listed: HashSet<&ItemRef> = existing.iter().map(|source| &source.item).collect();
        let settled = refs.iter().all(|item| {
            listed.contains(item)
                || (self.policy == MissingSourcePolicy::Drop
                    && matches!(cache.get(item), Some(None)))
        });
        if settled {
            trace!(referenced = refs.len(), "Cited sources unchanged");
            return Aggregation::Unchanged;
        }

        let span = debug_span!(
            "aggregate_sources",
            subsystem = "citations",
            component = "aggregator",
            result_count = field::Empty,
            lookup_count = field::Empty,
            reused_count = field::Empty,
            missing_count = field::Empty,
            duration_ms = field::Empty,
        );

        let plan = cache.plan(refs);
        let looked_up: Vec<Option<CitationEnrichment>> =
            stream::iter(plan.pending.iter().map(|item| self.lookup(item)))
                .buffered(self.concurrency)
                .collect::<Vec<_>>()
                .instrument(span.clone())
                .await;
        let fresh: Vec<(ItemRef, Option<CitationEnrichment>)> =
            plan.pending.iter().cloned().zip(looked_up).collect();
        let fresh_by_ref: HashMap<&ItemRef, &Option<CitationEnrichment>> =
            fresh.iter().map(|(item, enrichment)| (item, enrichment)).collect();

        let mut missing_count = 0;
        let mut sources: Vec<SourceCitation> = Vec::with_capacity(plan.ordered.len());
        for item in &plan.ordered {
            let resolved = fresh_by_ref
                .get(item)
                .copied()
                .or_else(|| cache.get(item))
                .cloned()
                .flatten();
            let (enrichment, invalid) = match resolved {
                Some(enrichment) => (enrichment, false),
                None => {
                    missing_count += 1;
                    match self.policy {
                        MissingSourcePolicy::Drop => continue,
                        MissingSourcePolicy::Placeholder => {
                            let label = labels
                                .get(item)
                                .cloned()
                                .unwrap_or_else(|| item.to_string());
                            (CitationEnrichment::placeholder(Some(&label)), true)
                        }
                    }
                }
            };
            sources.push(SourceCitation {
                item: item.clone(),
                enrichment,
                numeric_citation: (sources.len() + 1).to_string(),
                invalid,
            });
        }

        span.record(logging::RESULT_COUNT, sources.len());
        span.record(logging::LOOKUP_COUNT, plan.pending.len());
        span.record(logging::REUSED_COUNT, plan.reused_count());
        span.record(logging::MISSING_COUNT, missing_count);
        span.record(logging::DURATION_MS, started.elapsed().as_millis() as u64);
        span.in_scope(|| debug!("Source aggregation pass complete"));

        Aggregation::Updated { sources, fresh }
    }

    async fn lookup(&self, item: &ItemRef) -> Option<CitationEnrichment> {
        match self.enricher.enrich(item, None).await {
            Ok(Some(enrichment)) => Some(enrichment),
            Ok(None) => {
                debug!(library_id = item.library_id, item_key = %item.zotero_key, "Cited source not found");
                None
            }
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                warn!(
                    library_id = item.library_id,
                    item_key = %item.zotero_key,
                    error = %e,
                    "Source lookup failed, treating as missing"
                );
                None
            }
        }
    }
}
