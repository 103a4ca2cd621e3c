//! Analysis service HTTP client.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::analysis::error::{AnalysisError, AnalysisResult};
use crate::analysis::types::{
    AnalyzeFrameRequest, AnalyzeFrameResponse, BatchAnalysis, Mode, UploadResponse,
    FRAME_ERROR_MESSAGE,
};
use crate::config::ClientConfig;
use crate::media::SourceMedia;

/// The two remote operations the session depends on.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Upload a complete video and analyze every frame.
    ///
    /// Either the full timeline and rep count come back, or an error does.
    async fn analyze_batch(
        &self,
        media: Option<&SourceMedia>,
        mode: Mode,
    ) -> AnalysisResult<BatchAnalysis>;

    /// Analyze a single base64 JPEG still.
    async fn analyze_frame(&self, image: &str) -> AnalysisResult<Vec<String>>;

    /// Live-path variant of [`analyze_frame`](Self::analyze_frame): failures
    /// become the synthetic `["Error analyzing frame"]` feedback.
    async fn analyze_frame_or_degraded(&self, image: &str) -> Vec<String> {
        match self.analyze_frame(image).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!("Live frame analysis failed: {}", e);
                vec![FRAME_ERROR_MESSAGE.to_string()]
            }
        }
    }
}

/// reqwest-backed client for the analysis service
pub struct AnalysisClient {
    http: Client,
    config: ClientConfig,
}

impl AnalysisClient {
    /// Create a new analysis client.
    pub fn new(config: ClientConfig) -> AnalysisResult<Self> {
        let http = Client::builder()
            .timeout(config.upload_timeout)
            .build()?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> AnalysisResult<Self> {
        Self::new(ClientConfig::from_env())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

#[async_trait]
impl AnalysisService for AnalysisClient {
    async fn analyze_batch(
        &self,
        media: Option<&SourceMedia>,
        mode: Mode,
    ) -> AnalysisResult<BatchAnalysis> {
        let media = media.ok_or(AnalysisError::NoMedia)?;
        let bytes = media.read_bytes().await?;
        let url = self.config.endpoint("/upload");

        debug!(
            "Uploading {} ({} bytes, mode={}) to {}",
            media.name,
            bytes.len(),
            mode,
            url
        );

        // Codec parameters like `codecs=vp8,opus` are not valid in a part header
        let part = Part::bytes(bytes)
            .file_name(media.name.clone())
            .mime_str(media.mime_essence())?;
        let form = Form::new()
            .part("file", part)
            .text("mode", mode.as_str());

        let response = self.http.post(&url).multipart(form).send().await?;
        let status = response.status();
        let body = response.text().await?;

        parse_upload_response(status, &body)
    }

    async fn analyze_frame(&self, image: &str) -> AnalysisResult<Vec<String>> {
        let url = self.config.endpoint("/analyze_frame");

        let response = self
            .http
            .post(&url)
            .timeout(self.config.frame_timeout)
            .json(&AnalyzeFrameRequest { image })
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        parse_frame_response(status, &body)
    }
}

/// Interpret an `/upload` response body.
///
/// The body is parsed before the status is looked at, so an unparseable error
/// page is a protocol failure rather than a service one.
pub(crate) fn parse_upload_response(
    status: StatusCode,
    body: &str,
) -> AnalysisResult<BatchAnalysis> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| AnalysisError::protocol(e.to_string()))?;

    if !status.is_success() {
        let message = value
            .get("error")
            .and_then(|e| e.as_str())
            .unwrap_or("Upload failed")
            .to_string();
        return Err(AnalysisError::Service {
            status: status.as_u16(),
            message,
        });
    }

    let response: UploadResponse =
        serde_json::from_value(value).map_err(|e| AnalysisError::protocol(e.to_string()))?;
    response
        .results
        .ok_or_else(|| AnalysisError::protocol("response has no results"))
}

pub(crate) fn parse_frame_response(status: StatusCode, body: &str) -> AnalysisResult<Vec<String>> {
    if !status.is_success() {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or_else(|| format!("Frame analysis failed ({})", status));
        return Err(AnalysisError::Service {
            status: status.as_u16(),
            message,
        });
    }

    let response: AnalyzeFrameResponse =
        serde_json::from_str(body).map_err(|e| AnalysisError::protocol(e.to_string()))?;
    Ok(response.feedback)
}
