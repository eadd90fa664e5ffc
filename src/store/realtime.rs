//! REST client for the realtime database.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::DocumentStore;
use crate::error::{CheckoutError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Minimum length of every required credential field.
const MIN_FIELD_LEN: usize = 10;

/// Connection settings for the realtime database project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    pub api_key: String,
    pub auth_domain: String,
    pub database_url: String,
    pub project_id: String,
    /// Database secret or ID token passed as the `auth` query parameter
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl RealtimeConfig {
    /// Reject configurations that cannot possibly reach the project.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("api_key", &self.api_key),
            ("auth_domain", &self.auth_domain),
            ("database_url", &self.database_url),
            ("project_id", &self.project_id),
        ];
        for (field, value) in required {
            if value.trim().len() <= MIN_FIELD_LEN {
                return Err(CheckoutError::configuration(format!(
                    "Realtime database {} is missing or too short",
                    field
                )));
            }
        }

        if !self.api_key.starts_with("AIza") {
            tracing::warn!("Realtime database API key has an unusual format");
        }

        let url = Url::parse(&self.database_url).map_err(|e| {
            CheckoutError::configuration(format!("Invalid realtime database URL: {}", e))
        })?;
        let is_local = matches!(url.host_str(), Some("localhost") | Some("127.0.0.1"));
        if url.scheme() != "https" && !is_local {
            return Err(CheckoutError::configuration(
                "Realtime database URL must use HTTPS",
            ));
        }

        Ok(())
    }
}

/// [`DocumentStore`] backed by the realtime database REST API.
///
/// `PUT <db>/<path>.json` writes a document, `GET <db>/<path>.json` reads it
/// back (`null` when absent).
#[derive(Debug, Clone)]
pub struct RealtimeDatabase {
    http: Client,
    base: Url,
    auth_token: Option<String>,
}

impl RealtimeDatabase {
    pub fn connect(config: &RealtimeConfig) -> Result<Self> {
        config.validate()?;

        let mut base = config.database_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base).map_err(|e| {
            CheckoutError::configuration(format!("Invalid realtime database URL: {}", e))
        })?;

        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("premium-checkout/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CheckoutError::configuration(format!("HTTP client: {}", e)))?;

        tracing::info!(project_id = %config.project_id, "Realtime database client initialized");

        Ok(Self {
            http,
            base,
            auth_token: config.auth_token.clone(),
        })
    }

    fn url_for(&self, path: &str) -> Result<Url> {
        let mut url = self
            .base
            .join(&format!("{}.json", path.trim_matches('/')))
            .map_err(|e| CheckoutError::validation(format!("Invalid store path {}: {}", path, e)))?;
        if let Some(token) = &self.auth_token {
            url.query_pairs_mut().append_pair("auth", token);
        }
        Ok(url)
    }

    fn map_status(path: &str, status: StatusCode) -> CheckoutError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CheckoutError::configuration(
                format!("Realtime database rejected credentials ({})", status),
            ),
            _ => CheckoutError::transient(format!(
                "Realtime database returned {} for {}",
                status, path
            )),
        }
    }
}

#[async_trait]
impl DocumentStore for RealtimeDatabase {
    async fn set(&self, path: &str, document: &Value) -> Result<()> {
        let response = self
            .http
            .put(self.url_for(path)?)
            .json(document)
            .send()
            .await
            .map_err(|e| CheckoutError::transient(format!("Realtime database write: {}", e)))?;

        if !response.status().is_success() {
            return Err(Self::map_status(path, response.status()));
        }
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Value>> {
        let response = self
            .http
            .get(self.url_for(path)?)
            .send()
            .await
            .map_err(|e| CheckoutError::transient(format!("Realtime database read: {}", e)))?;

        if !response.status().is_success() {
            return Err(Self::map_status(path, response.status()));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| CheckoutError::transient(format!("Realtime database body: {}", e)))?;
        Ok(if value.is_null() { None } else { Some(value) })
    }
}
