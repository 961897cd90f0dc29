//! Progress storage trait

use crate::{LearnerProfile, Result};
use async_trait::async_trait;

/// Durable storage for the learner profile
#[async_trait]
pub trait ProgressStore: Send + Sync + 'static {
    /// Load the saved profile; `Ok(None)` when nothing has been saved yet
    async fn load(&self) -> Result<Option<LearnerProfile>>;

    /// Replace the saved profile
    async fn save(&self, profile: &LearnerProfile) -> Result<()>;

    /// Store name for logging
    fn name(&self) -> &str;
}
