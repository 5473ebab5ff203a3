use crate::mode::ModeSwitch;
use std::sync::{Arc, Mutex, PoisonError};

/// Single-slot, latest-wins mailbox between background work and the
/// presentation loop. A new value replaces whatever is pending.
#[derive(Debug)]
pub struct Handoff<T> {
    slot: Mutex<Option<(u64, T)>>,
    modes: Arc<ModeSwitch>,
}

impl<T> Handoff<T> {
    pub fn new(modes: Arc<ModeSwitch>) -> Self {
        Self {
            slot: Mutex::new(None),
            modes,
        }
    }

    pub fn accepts(&self, epoch: u64) -> bool {
        self.modes.is_current(epoch)
    }

    /// Returns false, and drops `value`, when `epoch` is no longer current.
    pub fn publish(&self, epoch: u64, value: T) -> bool {
        if !self.accepts(epoch) {
            tracing::debug!(epoch, "discarding result from previous mode");
            return false;
        }
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some((epoch, value));
        true
    }

    pub fn take(&self) -> Option<T> {
        let pending = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match pending {
            Some((epoch, value)) if self.modes.is_current(epoch) => Some(value),
            Some((epoch, _)) => {
                tracing::debug!(epoch, "dropping stale pending result");
                None
            }
            None => None,
        }
    }
}
