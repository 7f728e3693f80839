//! # beaver-session
//!
//! Per-thread state for the Beaver sidebar: one [`ThreadSession`] per open
//! chat thread, fed by backend stream events and user actions, publishing
//! [`SessionEvent`](beaver_core::SessionEvent)s when derived state changes.
//!
//! Also provides session configuration ([`config`]) and the bookkeeping for
//! sources attached to messages ([`sources`]).

pub mod cancel;
pub mod config;
pub mod replay;
pub mod session;
pub mod sources;

pub use cancel::CancelHandle;
pub use config::{ConfigError, ConfigResult, SessionConfig};
pub use replay::{Replay, ReplayOutput};
pub use session::ThreadSession;
pub use sources::{aggregate_thread_sources, validate_source, InputSources, SourceValidity};
