//! Backend health probe
//!
//! Polls `GET {api_base}/health` and classifies the backend as up or down.

use backoff::ExponentialBackoff;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::retry::{create_backoff, with_retry};
use crate::utils::AppError;

const REQUEST_TIMEOUT_SECS: u64 = 5;

/// `/health` response body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `RUNNING` or `ERROR`
    pub status: String,
    pub timestamp: Option<String>,
    pub db_time: Option<String>,
    pub db_version: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Up,
    Down,
}

/// Classified health result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthState {
    pub status: HealthStatus,
    pub label: &'static str,
}

impl HealthState {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Up,
            label: "Backend healthy",
        }
    }

    pub fn unhealthy() -> Self {
        Self {
            status: HealthStatus::Down,
            label: "Backend unhealthy",
        }
    }

    pub fn unreachable() -> Self {
        Self {
            status: HealthStatus::Down,
            label: "Backend unreachable",
        }
    }

    pub fn from_response(response: &HealthResponse) -> Self {
        if response.status == "RUNNING" {
            Self::healthy()
        } else {
            Self::unhealthy()
        }
    }

    pub fn is_up(&self) -> bool {
        self.status == HealthStatus::Up
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label)
    }
}

/// Health probe for the monitoring backend
#[derive(Debug, Clone)]
pub struct HealthClient {
    base_url: String,
    client: Client,
    backoff: ExponentialBackoff,
}

impl HealthClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self::with_client(base_url, client))
    }

    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: base_url.into().trim().trim_end_matches('/').to_string(),
            client,
            backoff: create_backoff(),
        }
    }

    /// Override the retry policy
    pub fn with_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url)
    }

    /// Fetches `/health`, retrying transient failures
    #[instrument(skip(self), fields(url = %self.health_url()))]
    pub async fn fetch(&self) -> Result<HealthResponse, AppError> {
        let url = self.health_url();
        with_retry(self.backoff.clone(), || async {
            let response = self.client.get(&url).send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(AppError::upstream(status.as_u16(), resolve_error_message(&body)));
            }
            let body = response.text().await?;
            Ok(serde_json::from_str::<HealthResponse>(&body)?)
        })
        .await
    }

    /// Probes the backend; failures map to "unreachable"
    pub async fn check(&self) -> HealthState {
        match self.fetch().await {
            Ok(response) => {
                let state = HealthState::from_response(&response);
                debug!(status = %response.status, health = %state, "Health check completed");
                state
            }
            Err(e) => {
                warn!(error = %e, code = e.error_code(), "Health check failed");
                HealthState::unreachable()
            }
        }
    }
}

/// Pulls `error` or `message` out of a JSON error body, else the raw text
fn resolve_error_message(body: &str) -> String {
    if let Ok(serde_json::Value::Object(fields)) = serde_json::from_str(body) {
        for key in ["error", "message"] {
            if let Some(serde_json::Value::String(msg)) = fields.get(key) {
                return msg.clone();
            }
        }
    }
    body.chars().take(200).collect()
}
