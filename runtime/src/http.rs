//! Preference service over HTTP.
//!
//! - star: `POST {base}/events/{id}/star`
//! - unstar: `DELETE {base}/events/{id}/star`
//!
//! Any 2xx answer is a success; the body is ignored.

use crate::config::ApiConfig;
use star_sync_core::preference::{
    EntityId, PreferenceError, PreferenceFuture, PreferenceResult, PreferenceService,
};
use std::time::Duration;

/// Maximum length of an error body kept in [`PreferenceError::Rejected`]
const MAX_ERROR_BODY: usize = 512;

/// [`PreferenceService`] backed by the events API
#[derive(Debug, Clone)]
pub struct HttpPreferenceService {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpPreferenceService {
    /// Create a service for `base_url` with the given request timeout
    ///
    /// # Errors
    ///
    /// Returns [`PreferenceError::Unavailable`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PreferenceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PreferenceError::Unavailable(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: None,
        })
    }

    /// Create a service from configuration
    ///
    /// # Errors
    ///
    /// Returns [`PreferenceError::Unavailable`] if no base URL is configured or
    /// the HTTP client cannot be built.
    pub fn from_config(config: &ApiConfig) -> Result<Self, PreferenceError> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| PreferenceError::Unavailable("STAR_SYNC_API_URL is not set".into()))?;

        let service = Self::new(base_url, config.timeout())?;
        Ok(match &config.auth_token {
            Some(token) => service.with_auth_token(token.clone()),
            None => service,
        })
    }

    /// Send `Authorization: Bearer <token>` with every request
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// URL of the star resource of an entity
    #[must_use]
    pub fn star_url(&self, entity_id: &EntityId) -> String {
        format!("{}/events/{}/star", self.base_url, entity_id)
    }

    fn request(&self, method: reqwest::Method, entity_id: EntityId) -> PreferenceFuture {
        let mut request = self.client.request(method.clone(), self.star_url(&entity_id));
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        Box::pin(async move {
            let result = send(request).await;
            match &result {
                Ok(()) => tracing::debug!(%method, entity_id = %entity_id, "Preference written"),
                Err(error) => {
                    tracing::warn!(%method, entity_id = %entity_id, error = %error, "Preference request failed");
                },
            }
            result
        })
    }
}

async fn send(request: reqwest::RequestBuilder) -> PreferenceResult {
    let response = request.send().await.map_err(classify)?;

    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let mut message = response.text().await.unwrap_or_default();
    if message.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message.truncate(end);
    }

    Err(PreferenceError::Rejected {
        status: status.as_u16(),
        message,
    })
}

fn classify(error: reqwest::Error) -> PreferenceError {
    if error.is_timeout() {
        PreferenceError::Timeout
    } else {
        PreferenceError::Network(error.to_string())
    }
}

impl PreferenceService for HttpPreferenceService {
    fn set_true(&self, entity_id: EntityId) -> PreferenceFuture {
        self.request(reqwest::Method::POST, entity_id)
    }

    fn set_false(&self, entity_id: EntityId) -> PreferenceFuture {
        self.request(reqwest::Method::DELETE, entity_id)
    }
}
