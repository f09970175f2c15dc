//! External speech-to-text abstraction.
//!
//! A transcript is only ever used as a better word count for the speech-rate
//! metric. Any failure is the caller's cue to fall back to spectral flux, so
//! implementations return errors instead of retrying internally.

#[cfg(feature = "deepgram")]
pub mod deepgram;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscribedWord {
    pub word: String,
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub end: f64,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    pub transcript: String,
    pub words: Vec<TranscribedWord>,
    pub confidence: f64,
    /// Audio duration reported by the service, in seconds.
    pub duration: f64,
}

impl Transcription {
    /// Number of timed words. The transcript text is not counted, so an
    /// empty word list reads as 0 and sends the caller to its fallback.
    pub fn word_count(&self) -> u32 {
        u32::try_from(self.words.len()).unwrap_or(u32::MAX)
    }
}

/// Contract for speech-to-text backends.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Backend identifier used in logs (e.g. `"deepgram"`).
    fn name(&self) -> &'static str;

    /// Transcribe an encoded audio blob (WAV, WebM, ...).
    ///
    /// # Errors
    /// Network, HTTP-status and response-shape failures map to
    /// [`VigorError::Transcription`](crate::error::VigorError::Transcription).
    async fn transcribe(&self, audio: &[u8]) -> Result<Transcription>;
}
