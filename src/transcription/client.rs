use async_trait::async_trait;
use reqwest::multipart;
use thiserror::Error;
use tracing::{debug, info};

use crate::audio::AudioArtifact;

/// Transcription errors
#[derive(Debug, Clone, Error)]
pub enum TranscriptionError {
    /// The endpoint could not be reached at all
    #[error("Transcription request failed: {0}")]
    RequestFailed(String),

    /// The service answered with a non-success status
    #[error("Transcription service error: {0}")]
    ServerError(String),

    /// Success status, but the body carried no transcription text
    #[error("Transcription service returned no transcription text")]
    MissingTranscription,
}

/// Port for audio transcription
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Submit one artifact and await exactly one response
    async fn submit(&self, artifact: &AudioArtifact) -> Result<String, TranscriptionError>;
}

/// HTTP client for the remote transcription endpoint
pub struct HttpTranscriptionClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTranscriptionClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Transcriber for HttpTranscriptionClient {
    /// No retry and no client-side timeout: a hung request holds its session
    /// until the transport itself fails it
    async fn submit(&self, artifact: &AudioArtifact) -> Result<String, TranscriptionError> {
        let part = multipart::Part::bytes(artifact.bytes.clone())
            .file_name(artifact.file_name.clone())
            .mime_str(artifact.mime_type)
            .map_err(|e| TranscriptionError::RequestFailed(e.to_string()))?;
        let form = multipart::Form::new().part("audio", part);

        info!(
            "Submitting {} artifact ({} bytes) to {}",
            artifact.mime_type,
            artifact.bytes.len(),
            self.endpoint
        );

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TranscriptionError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // The service reports failures as {"error": "..."}; surface that
            // message next to the status when it is present
            let detail = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string));
            let message = match detail {
                Some(detail) => format!("{}: {}", status, detail),
                None => status.to_string(),
            };
            return Err(TranscriptionError::ServerError(message));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| TranscriptionError::ServerError(format!("invalid response body: {}", e)))?;

        match body.get("transcription").and_then(|t| t.as_str()) {
            Some(text) => {
                debug!("Transcription received ({} chars)", text.len());
                Ok(text.to_string())
            }
            None => Err(TranscriptionError::MissingTranscription),
        }
    }
}
