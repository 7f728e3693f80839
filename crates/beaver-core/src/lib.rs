//! # beaver-core
//!
//! Core types, traits, and abstractions for the Beaver research assistant.
//!
//! This crate provides the data model shared by the citation pipeline and
//! the thread session, the [`ItemRepository`] seam to the Zotero host, and
//! an in-memory repository for tests and offline replay.

pub mod defaults;
pub mod error;
pub mod events;
pub mod in_memory;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use events::{EventBus, EventEnvelope, SessionEvent};
pub use in_memory::{InMemoryItemRepository, LookupCall, LookupOperation};
pub use models::*;
pub use traits::*;
