// Client for the external report classifier
// Decision: The classifier is a plain HTTP service: POST /classify {text}
// Decision: Labels are a closed enum; unknown labels are treated as a protocol error

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Severity label assigned by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum ThreatLabel {
    Benign,
    Suspicious,
    Critical,
}

/// Classification result for a single report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Classification {
    pub label: ThreatLabel,
    /// Probability of the predicted label, in [0, 1]
    pub confidence: f64,
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("report text is empty")]
    EmptyText,

    #[error("classifier request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("classifier returned status {0}")]
    Status(u16),

    #[error("classifier returned confidence out of range: {0}")]
    InvalidConfidence(f64),
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct ClassifyResponse {
    predicted_class: ThreatLabel,
    confidence: f64,
}

/// HTTP client for the classifier service
#[derive(Clone)]
pub struct ClassifierClient {
    http: reqwest::Client,
    base_url: String,
}

impl ClassifierClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClassifierError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Classify a report's text
    pub async fn classify(&self, text: &str) -> Result<Classification, ClassifierError> {
        if text.trim().is_empty() {
            return Err(ClassifierError::EmptyText);
        }

        let response = self
            .http
            .post(format!("{}/classify", self.base_url))
            .json(&ClassifyRequest { text })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassifierError::Status(status.as_u16()));
        }

        let body: ClassifyResponse = response.json().await?;
        if !(0.0..=1.0).contains(&body.confidence) {
            return Err(ClassifierError::InvalidConfidence(body.confidence));
        }

        Ok(Classification {
            label: body.predicted_class,
            confidence: body.confidence,
        })
    }
}
