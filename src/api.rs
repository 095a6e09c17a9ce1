// HTTP client for the remote draft authority.
//
// The authority is the single source of truth: snapshot polls are how a
// client learns anything, and a pick submission's HTTP result is advisory
// until corroborated by a later snapshot.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::draft::snapshot::{DraftSnapshot, StatusSnapshot};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("authority returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// The authority refused a pick submission with a structured reason
    /// (e.g. the driver was taken by the time the request landed).
    #[error("pick rejected: {reason}")]
    PickRejected { reason: String },
}

/// The authority's acknowledgement of a pick submission. Receipt of this is
/// NOT proof of commit; only the pick reappearing in a snapshot is.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    /// The version at which the authority processed the submission, when
    /// reported. Useful for logging; never used to advance the view.
    #[serde(default)]
    pub version: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitBody<'a> {
    driver_id: &'a str,
}

/// The remote draft authority, behind a trait so the session loop can be
/// driven by a scripted in-memory implementation in tests.
#[async_trait]
pub trait DraftAuthority: Send + Sync {
    /// Full snapshot: window, participants with picks, driver availability,
    /// version marker.
    async fn fetch_snapshot(&self) -> Result<DraftSnapshot, ApiError>;

    /// Lightweight status-only variant for high-frequency polling.
    async fn fetch_status(&self) -> Result<StatusSnapshot, ApiError>;

    /// Submit a pick. A structured rejection is terminal for the attempt;
    /// success still awaits snapshot corroboration.
    async fn submit_pick(&self, driver_id: &str) -> Result<SubmitReceipt, ApiError>;
}

/// reqwest-backed authority client.
pub struct HttpAuthority {
    http: reqwest::Client,
    base_url: String,
    league_id: String,
}

impl HttpAuthority {
    pub fn new(base_url: impl Into<String>, league_id: impl Into<String>) -> Self {
        HttpAuthority {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            league_id: league_id.into(),
        }
    }

    fn draft_url(&self, suffix: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!("{base}/leagues/{}/draft{suffix}", self.league_id)
    }
}

#[async_trait]
impl DraftAuthority for HttpAuthority {
    async fn fetch_snapshot(&self) -> Result<DraftSnapshot, ApiError> {
        let url = self.draft_url("");
        debug!(%url, "polling draft snapshot");
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: extract_message(&body),
            });
        }
        Ok(response.json().await?)
    }

    async fn fetch_status(&self) -> Result<StatusSnapshot, ApiError> {
        let url = self.draft_url("/status");
        debug!(%url, "polling draft status");
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: extract_message(&body),
            });
        }
        Ok(response.json().await?)
    }

    async fn submit_pick(&self, driver_id: &str) -> Result<SubmitReceipt, ApiError> {
        let url = self.draft_url("/picks");
        debug!(%url, driver_id, "submitting pick");
        let response = self
            .http
            .post(&url)
            .json(&SubmitBody { driver_id })
            .send()
            .await?;
        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::PickRejected {
                reason: extract_message(&body),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: extract_message(&body),
            });
        }
        Ok(response.json().await.unwrap_or(SubmitReceipt { version: None }))
    }
}

/// Pull a human-readable message out of an error body. The authority sends
/// `{"reason": "..."}` or `{"error": "..."}`; fall back to the raw body.
fn extract_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["reason", "error", "message"] {
            if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
                return text.to_string();
            }
        }
    }
    if body.is_empty() {
        "no error detail provided".to_string()
    } else {
        body.to_string()
    }
}
