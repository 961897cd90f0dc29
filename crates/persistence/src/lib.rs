//! Learner progress storage
//!
//! Provides `ProgressStore` backends:
//! - `FileProgressStore`: JSON document on local disk
//! - `HttpProgressStore`: remote progress API (`/api/progress`, bearer auth)
//! - `MemoryProgressStore`: in-process only
//!
//! All backends share one document shape, `{"profile": ...}`, so saved
//! progress moves freely between them.

pub mod error;
pub mod file;
pub mod http;
pub mod memory;

pub use error::PersistenceError;
pub use file::FileProgressStore;
pub use http::HttpProgressStore;
pub use memory::MemoryProgressStore;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use voice_tutor_config::{PersistenceBackend, PersistenceConfig};
use voice_tutor_core::{LearnerProfile, ProgressStore};

/// Stored progress document
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProgressDocument {
    #[serde(default)]
    pub profile: Option<LearnerProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl ProgressDocument {
    pub fn new(profile: &LearnerProfile) -> Self {
        Self {
            profile: Some(profile.clone()),
            updated_at: Some(chrono::Utc::now()),
        }
    }
}

/// Open the store selected by configuration
pub fn open_store(config: &PersistenceConfig) -> Result<Arc<dyn ProgressStore>, PersistenceError> {
    let store: Arc<dyn ProgressStore> = match config.backend {
        PersistenceBackend::File => Arc::new(FileProgressStore::new(&config.path)),
        PersistenceBackend::Http => {
            let url = config.url.clone().ok_or_else(|| {
                PersistenceError::Configuration("persistence.url is required".to_string())
            })?;
            Arc::new(HttpProgressStore::new(
                url,
                config.resolved_auth_token(),
                config.timeout(),
            )?)
        },
        PersistenceBackend::Memory => Arc::new(MemoryProgressStore::new()),
    };

    tracing::info!(backend = store.name(), "Progress store ready");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_store_per_backend() {
        let mut config = PersistenceConfig {
            backend: PersistenceBackend::Memory,
            ..Default::default()
        };
        assert_eq!(open_store(&config).unwrap().name(), "memory");

        config.backend = PersistenceBackend::File;
        assert_eq!(open_store(&config).unwrap().name(), "file");

        config.backend = PersistenceBackend::Http;
        assert!(open_store(&config).is_err());
        config.url = Some("http://localhost:3001".to_string());
        assert_eq!(open_store(&config).unwrap().name(), "http");
    }

    #[test]
    fn test_document_accepts_null_profile() {
        let doc: ProgressDocument = serde_json::from_str(r#"{"profile": null}"#).unwrap();
        assert!(doc.profile.is_none());
    }
}
