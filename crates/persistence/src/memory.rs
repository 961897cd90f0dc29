//! In-memory progress store

use async_trait::async_trait;
use parking_lot::Mutex;

use voice_tutor_core::{LearnerProfile, ProgressStore};

/// Progress held in process memory
#[derive(Default)]
pub struct MemoryProgressStore {
    profile: Mutex<Option<LearnerProfile>>,
    saves: Mutex<usize>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a saved profile
    pub fn with_profile(profile: LearnerProfile) -> Self {
        Self {
            profile: Mutex::new(Some(profile)),
            saves: Mutex::new(0),
        }
    }

    /// Last saved profile
    pub fn saved(&self) -> Option<LearnerProfile> {
        self.profile.lock().clone()
    }

    /// Number of saves performed
    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn load(&self) -> voice_tutor_core::Result<Option<LearnerProfile>> {
        Ok(self.profile.lock().clone())
    }

    async fn save(&self, profile: &LearnerProfile) -> voice_tutor_core::Result<()> {
        *self.profile.lock() = Some(profile.clone());
        *self.saves.lock() += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
