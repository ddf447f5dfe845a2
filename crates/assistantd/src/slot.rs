//! ExclusiveSlot - the capacity-1 permit guarding the inference engine.
//!
//! The permit is held for the whole session, not per request: it implements
//! session-level mutual exclusion. Acquisition is serialized by the single
//! accept loop, so check-then-acquire is race-free.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Process-wide gate allowing one active inference session at a time.
#[derive(Clone, Debug)]
pub struct ExclusiveSlot {
    inner: Arc<Semaphore>,
}

impl ExclusiveSlot {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Semaphore::new(1)),
        }
    }

    /// Non-blocking acquire. `None` means a session currently holds the slot.
    pub fn try_acquire(&self) -> Option<SlotPermit> {
        self.inner
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| SlotPermit {
                permit: Some(permit),
            })
    }

    pub fn is_held(&self) -> bool {
        self.inner.available_permits() == 0
    }
}

impl Default for ExclusiveSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// The held slot for one session.
///
/// Released on drop, so every session exit path frees the slot even if the
/// session task panics.
pub struct SlotPermit {
    permit: Option<OwnedSemaphorePermit>,
}

impl SlotPermit {
    /// Explicit release, used by session teardown so the ordering
    /// (close connection, reset engine, release slot) is visible at the
    /// call site.
    pub fn release(mut self) {
        if self.permit.take().is_some() {
            tracing::info!("inference slot released");
        }
    }
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        if self.permit.take().is_some() {
            tracing::info!("inference slot released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_starts_free() {
        let slot = ExclusiveSlot::new();
        assert!(!slot.is_held());
    }

    #[test]
    fn second_acquire_fails_while_held() {
        let slot = ExclusiveSlot::new();

        let permit = slot.try_acquire();
        assert!(permit.is_some());
        assert!(slot.is_held());

        assert!(slot.try_acquire().is_none());
    }

    #[test]
    fn drop_frees_the_slot() {
        let slot = ExclusiveSlot::new();

        {
            let _permit = slot.try_acquire().unwrap();
            assert!(slot.is_held());
        }

        assert!(!slot.is_held());
        assert!(slot.try_acquire().is_some());
    }

    #[test]
    fn explicit_release_frees_the_slot() {
        let slot = ExclusiveSlot::new();

        let permit = slot.try_acquire().unwrap();
        permit.release();

        assert!(!slot.is_held());
    }
}
