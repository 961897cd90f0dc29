//! JSON file progress store

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use voice_tutor_core::{LearnerProfile, ProgressStore};

use crate::{PersistenceError, ProgressDocument};

/// Progress kept in a single JSON file
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// crash mid-write leaves the previous save intact.
pub struct FileProgressStore {
    path: PathBuf,
}

impl FileProgressStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> Result<Option<LearnerProfile>, PersistenceError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }

        let doc: ProgressDocument = serde_json::from_str(&raw)
            .map_err(|e| PersistenceError::Corrupt(format!("{}: {}", self.path.display(), e)))?;
        Ok(doc.profile)
    }

    pub async fn write(&self, profile: &LearnerProfile) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_vec_pretty(&ProgressDocument::new(profile))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for FileProgressStore {
    async fn load(&self) -> voice_tutor_core::Result<Option<LearnerProfile>> {
        Ok(self.read().await?)
    }

    async fn save(&self, profile: &LearnerProfile) -> voice_tutor_core::Result<()> {
        self.write(profile).await?;
        tracing::debug!(path = %self.path.display(), level = profile.level(), "Progress saved");
        Ok(())
    }

    fn name(&self) -> &str {
        "file"
    }
}
