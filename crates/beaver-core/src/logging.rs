//! Structured logging field name constants for Beaver.
//!
//! All crates use these constants for consistent structured logging fields,
//! so a single filter can follow one thread or one citation across the
//! parser, resolver, aggregator and session.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Unexpected failure, state may be inconsistent |
//! | WARN  | Host lookup failed, degraded record produced |
//! | INFO  | Thread lifecycle (load, switch), configuration |
//! | DEBUG | Pass summaries, missing items, cancellations |
//! | TRACE | Per-marker and per-record detail |
//!
//! Partial citation tags at the tail of a streaming buffer are expected and
//! are never logged above TRACE.

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "citations", "session", "sources", "config"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "marker_parser", "resolver", "aggregator", "cache"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "resolve", "aggregate", "apply_event", "commit"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Chat thread identifier.
pub const THREAD_ID: &str = "thread_id";

/// Chat message identifier.
pub const MESSAGE_ID: &str = "message_id";

/// Citation identifier from a marker or metadata record.
pub const CITATION_ID: &str = "citation_id";

/// Zotero library identifier.
pub const LIBRARY_ID: &str = "library_id";

/// Zotero item key.
pub const ITEM_KEY: &str = "item_key";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of records produced by a pass.
pub const RESULT_COUNT: &str = "result_count";

/// Number of host lookups issued by a pass.
pub const LOOKUP_COUNT: &str = "lookup_count";

/// Number of records carried forward from the reconciliation cache.
pub const REUSED_COUNT: &str = "reused_count";

/// Number of items dropped or degraded because they did not resolve.
pub const MISSING_COUNT: &str = "missing_count";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
