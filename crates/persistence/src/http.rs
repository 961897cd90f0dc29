//! Remote progress API store
//!
//! `GET {base}/api/progress` returns `{"profile": ... | null}`;
//! `POST {base}/api/progress` replaces it. Both carry a bearer token.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use voice_tutor_core::{LearnerProfile, ProgressStore};

use crate::{PersistenceError, ProgressDocument};

pub struct HttpProgressStore {
    base_url: String,
    token: Option<String>,
    client: Client,
}

impl HttpProgressStore {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, PersistenceError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(PersistenceError::Configuration(
                "progress API url is empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PersistenceError::Network(e.to_string()))?;

        Ok(Self {
            base_url,
            token,
            client,
        })
    }

    fn progress_url(&self) -> String {
        format!("{}/api/progress", self.base_url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Fetch saved progress; an unsuccessful response means nothing is saved
    pub async fn fetch(&self) -> Result<Option<LearnerProfile>, PersistenceError> {
        let response = self
            .authorize(self.client.get(self.progress_url()))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%status, "Progress API refused load; starting without saved progress");
            return Ok(None);
        }

        let doc: ProgressDocument = response
            .json()
            .await
            .map_err(|e| PersistenceError::Corrupt(e.to_string()))?;
        Ok(doc.profile)
    }

    pub async fn store(&self, profile: &LearnerProfile) -> Result<(), PersistenceError> {
        let response = self
            .authorize(self.client.post(self.progress_url()))
            .json(&ProgressDocument {
                profile: Some(profile.clone()),
                updated_at: None,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(PersistenceError::Api(format!("HTTP {}: {}", status, error_text)));
        }
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for HttpProgressStore {
    async fn load(&self) -> voice_tutor_core::Result<Option<LearnerProfile>> {
        Ok(self.fetch().await?)
    }

    async fn save(&self, profile: &LearnerProfile) -> voice_tutor_core::Result<()> {
        self.store(profile).await?;
        tracing::debug!(url = %self.progress_url(), level = profile.level(), "Progress saved");
        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}
