use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::models::ModelKind;

/// Endpoint URLs for the two analysis models.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub numerical_url: String,
    pub non_numerical_url: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            numerical_url: "http://localhost:8000/predictes".to_string(),
            non_numerical_url: "http://localhost:8000/predict".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Analysis service returned status {0}")]
    Status(StatusCode),

    #[error("Analysis service request failed: {0}")]
    Network(#[from] reqwest::Error),
}

/// Outbound prediction request. File content is inlined into `text`; the
/// metadata fields describe the attachment itself.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequest {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    pub has_file: bool,
}

/// The model's sentiment verdict.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SentimentReply {
    pub sentiment: String,
    pub score: f64,
}

impl SentimentReply {
    /// Assistant-message text, exactly as stored in the thread.
    pub fn display(&self) -> String {
        format!("{} (Score: {})", self.sentiment, self.score)
    }
}

/// HTTP client for the remote analysis model.
///
/// The service is an opaque collaborator: possibly slow, possibly failing.
/// Failures are surfaced as typed errors and never retried here; recovery
/// is user-initiated.
#[derive(Debug, Clone)]
pub struct AnalysisClient {
    http: reqwest::Client,
    config: AnalysisConfig,
}

impl AnalysisClient {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn endpoint_for(&self, model: ModelKind) -> &str {
        match model {
            ModelKind::Numerical => &self.config.numerical_url,
            ModelKind::NonNumerical => &self.config.non_numerical_url,
        }
    }

    /// Send text (and attachment metadata) to the endpoint selected by
    /// `model` and return the parsed verdict.
    pub async fn predict(
        &self,
        model: ModelKind,
        request: &AnalysisRequest,
    ) -> Result<SentimentReply, AnalysisError> {
        let url = self.endpoint_for(model);
        debug!(%url, has_file = request.has_file, "Requesting analysis");

        let response = self.http.post(url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnalysisError::Status(status));
        }

        Ok(response.json().await?)
    }
}
