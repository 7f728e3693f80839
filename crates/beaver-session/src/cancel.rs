//! Cancellation flags for streamed messages.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag marking one message as canceled.
///
/// Clones share the flag, so the UI can hold a handle while the session
/// checks it after each awaited lookup pass.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    canceled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

/// Cancel handles keyed by message ID.
#[derive(Debug, Default)]
pub(crate) struct CancelRegistry {
    handles: HashMap<String, CancelHandle>,
}

impl CancelRegistry {
    /// Handle for `message_id`, created on first use.
    pub fn handle(&mut self, message_id: &str) -> CancelHandle {
        self.handles
            .entry(message_id.to_string())
            .or_default()
            .clone()
    }

    pub fn is_canceled(&self, message_id: &str) -> bool {
        self.handles
            .get(message_id)
            .is_some_and(CancelHandle::is_canceled)
    }

    /// Mark `message_id` canceled; returns false if it already was.
    pub fn cancel(&mut self, message_id: &str) -> bool {
        let handle = self.handle(message_id);
        let first = !handle.is_canceled();
        handle.cancel();
        first
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let handle = CancelHandle::new();
        let ui_side = handle.clone();
        assert!(!handle.is_canceled());
        ui_side.cancel();
        assert!(handle.is_canceled());
    }

    #[test]
    fn test_registry() {
        let mut registry = CancelRegistry::default();
        let handle = registry.handle("m1");
        assert!(!registry.is_canceled("m1"));
        assert!(!registry.is_canceled("unknown"));

        assert!(registry.cancel("m1"));
        assert!(!registry.cancel("m1"));
        assert!(handle.is_canceled());
        assert!(!registry.is_canceled("m2"));
    }
}
