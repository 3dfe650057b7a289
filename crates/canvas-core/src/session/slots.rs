//! One in-flight session per requester.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotError {
    #[error("a generation is already in flight for `{0}`")]
    Busy(String),
}

/// Registry of requester keys with an active session.
#[derive(Debug, Clone, Default)]
pub struct SessionSlots {
    active: Arc<Mutex<HashSet<String>>>,
}

impl SessionSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for `key`. The slot is freed when the guard drops.
    pub fn acquire(&self, key: impl Into<String>) -> Result<SlotGuard, SlotError> {
        let key = key.into();
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(key.clone()) {
            return Err(SlotError::Busy(key));
        }
        debug!(requester = %key, "slot acquired");
        Ok(SlotGuard {
            key,
            active: Arc::clone(&self.active),
        })
    }

    pub fn is_busy(&self, key: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Holds a requester's slot.
#[derive(Debug)]
pub struct SlotGuard {
    key: String,
    active: Arc<Mutex<HashSet<String>>>,
}

impl SlotGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
        debug!(requester = %self.key, "slot released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_busy_until_release() {
        let slots = SessionSlots::new();
        let guard = slots.acquire("alice").unwrap();
        assert_eq!(guard.key(), "alice");
        assert_eq!(
            slots.acquire("alice").unwrap_err(),
            SlotError::Busy("alice".into())
        );
        assert!(slots.acquire("bob").is_ok());

        drop(guard);
        assert!(!slots.is_busy("alice"));
        let _again = slots.acquire("alice").unwrap();
        assert_eq!(slots.active_count(), 1);
    }

    #[test]
    fn clones_share_the_registry() {
        let slots = SessionSlots::new();
        let other = slots.clone();
        let _guard = slots.acquire("k").unwrap();
        assert!(other.is_busy("k"));
    }
}
