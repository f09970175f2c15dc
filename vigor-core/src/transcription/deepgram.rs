//! Deepgram pre-recorded audio client.
//!
//! `POST {base_url}/v1/listen?model=<model>&smart_format=true` with the raw
//! audio blob as the body and `Authorization: Token <key>`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::{TranscribedWord, Transcriber, Transcription};
use crate::error::{Result, VigorError};

pub const DEFAULT_BASE_URL: &str = "https://api.deepgram.com";
pub const DEFAULT_MODEL: &str = "nova-2";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct DeepgramConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl DeepgramConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListenResponse {
    #[serde(default)]
    metadata: Option<ListenMetadata>,
    results: ListenResults,
}

#[derive(Debug, Deserialize)]
struct ListenMetadata {
    #[serde(default)]
    duration: f64,
}

#[derive(Debug, Deserialize)]
struct ListenResults {
    channels: Vec<ListenChannel>,
}

#[derive(Debug, Deserialize)]
struct ListenChannel {
    alternatives: Vec<ListenAlternative>,
}

#[derive(Debug, Deserialize)]
struct ListenAlternative {
    #[serde(default)]
    transcript: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    words: Vec<TranscribedWord>,
}

/// Extract the first alternative of the first channel.
fn parse_listen_response(body: &str) -> Result<Transcription> {
    let response: ListenResponse = serde_json::from_str(body)?;
    let duration = response.metadata.map_or(0.0, |m| m.duration);
    let alternative = response
        .results
        .channels
        .into_iter()
        .next()
        .and_then(|c| c.alternatives.into_iter().next())
        .ok_or_else(|| VigorError::Transcription("response has no alternatives".into()))?;

    Ok(Transcription {
        transcript: alternative.transcript,
        words: alternative.words,
        confidence: alternative.confidence,
        duration,
    })
}

#[derive(Debug)]
pub struct DeepgramTranscriber {
    client: reqwest::Client,
    config: DeepgramConfig,
}

impl DeepgramTranscriber {
    pub fn new(config: DeepgramConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(VigorError::Transcription("Deepgram API key is empty".into()));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| VigorError::Transcription(format!("failed to create HTTP client: {e}")))?;
        info!(model = %config.model, "Deepgram transcriber ready");
        Ok(Self { client, config })
    }

    fn listen_url(&self) -> String {
        format!(
            "{}/v1/listen?model={}&smart_format=true",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl Transcriber for DeepgramTranscriber {
    fn name(&self) -> &'static str {
        "deepgram"
    }

    async fn transcribe(&self, audio: &[u8]) -> Result<Transcription> {
        let url = self.listen_url();
        debug!(bytes = audio.len(), %url, "sending audio to Deepgram");

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, format!("Token {}", self.config.api_key))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|e| VigorError::Transcription(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| VigorError::Transcription(format!("failed to read response: {e}")))?;
        if !status.is_success() {
            return Err(VigorError::Transcription(format!(
                "Deepgram returned {status}: {body}"
            )));
        }

        let transcription = parse_listen_response(&body)?;
        debug!(
            words = transcription.words.len(),
            confidence = transcription.confidence,
            "Deepgram transcription received"
        );
        Ok(transcription)
    }
}
