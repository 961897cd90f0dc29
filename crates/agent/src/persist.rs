//! Debounced progress persistence
//!
//! Every profile change reschedules a single pending save; only the last
//! profile scheduled within the quiet period is written.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use voice_tutor_core::{LearnerProfile, ProgressStore};

pub struct DebouncedSaver {
    store: Arc<dyn ProgressStore>,
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl DebouncedSaver {
    pub fn new(store: Arc<dyn ProgressStore>, delay: Duration) -> Self {
        Self {
            store,
            delay,
            pending: Mutex::new(None),
        }
    }

    /// Replace any pending save with one for `profile`
    pub fn schedule(&self, profile: LearnerProfile) {
        let store = self.store.clone();
        let delay = self.delay;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match store.save(&profile).await {
                Ok(()) => tracing::debug!(
                    store = store.name(),
                    level = profile.level(),
                    sessions = profile.sessions(),
                    "Progress persisted"
                ),
                Err(e) => tracing::warn!(store = store.name(), error = %e, "Failed to persist progress"),
            }
        });

        if let Some(previous) = self.pending.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Drop the pending save without writing it
    ///
    /// Returns true if a save was still waiting.
    pub fn cancel(&self) -> bool {
        match self.pending.lock().take() {
            Some(handle) => {
                let waiting = !handle.is_finished();
                handle.abort();
                waiting
            },
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for DebouncedSaver {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.get_mut().take() {
            handle.abort();
        }
    }
}
