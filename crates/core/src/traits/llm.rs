//! Inference service trait

use crate::{Message, Result};
use async_trait::async_trait;

/// Conversational inference service
///
/// Implementations send the system instruction together with the full
/// API-form history and return the reply's text blocks in order.
#[async_trait]
pub trait InferenceClient: Send + Sync + 'static {
    /// Request one reply
    async fn complete(&self, system: &str, messages: &[Message]) -> Result<Vec<String>>;

    /// Get model name for logging
    fn model_name(&self) -> &str;
}
