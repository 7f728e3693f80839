//! Centralized default constants for Beaver.
//!
//! **This module is the single source of truth** for shared default values.
//! Configuration types and tests reference these constants instead of
//! defining their own magic numbers.

// =============================================================================
// RESOLUTION
// =============================================================================

/// Maximum number of host item lookups in flight within one resolution pass.
pub const LOOKUP_CONCURRENCY: usize = 8;

/// Library ID of the local user library in Zotero.
pub const USER_LIBRARY_ID: i64 = 1;

// =============================================================================
// EVENTS
// =============================================================================

/// Default session event bus broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// FORMATTING
// =============================================================================

/// Maximum characters of a note title derived from note content.
pub const NOTE_TITLE_MAX_CHARS: usize = 80;

/// Maximum characters of annotation text used as a display name.
pub const ANNOTATION_NAME_MAX_CHARS: usize = 60;

/// Display name used for a note without any text.
pub const UNTITLED_NOTE: &str = "Untitled Note";

/// Content type accepted for attachment sources.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Directory name under the platform config dir.
pub const CONFIG_DIR_NAME: &str = "beaver";

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "beaver.toml";
