//! Words-per-minute estimation with a fixed fallback order.
//!
//! ```text
//! word_count == None ───────────────────────────────► spectral-flux
//! deepgram-stt | web-speech-api ──(count > 0)──────► transcript count
//!                                └─(count == 0)─────► spectral-flux
//! spectral-flux ────────────────────────────────────► spectral-flux
//! energy-peaks ──(VAD segments)─► vad-enhanced
//!              └─(none)─────────► energy-peaks
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::onset::{count_energy_peaks, count_flux_onsets};
use super::{clamp_score, lerp};
use crate::audio::AudioBuffer;
use crate::config::{SpeechRateMethod, Thresholds};
use crate::vad::VadMetrics;

/// Assumed syllables per English word when converting onsets to words.
pub const DEFAULT_SYLLABLES_PER_WORD: f64 = 1.5;

/// The method that actually produced the estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RateMethodUsed {
    DeepgramStt,
    WebSpeechApi,
    SpectralFlux,
    VadEnhanced,
    EnergyPeaks,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechRateResult {
    pub words_per_minute: f64,
    pub method: RateMethodUsed,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub syllable_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_count: Option<u32>,
    pub effective_duration_secs: f64,
    pub score: f64,
}

impl SpeechRateResult {
    pub fn zero() -> Self {
        Self {
            words_per_minute: 0.0,
            method: RateMethodUsed::SpectralFlux,
            syllable_count: None,
            word_count: None,
            effective_duration_secs: 0.0,
            score: 0.0,
        }
    }
}

/// Per-call knobs for [`analyze_speech_rate`].
#[derive(Debug, Clone, Copy)]
pub struct SpeechRateParams {
    pub method: SpeechRateMethod,
    pub thresholds: Thresholds,
    pub syllables_per_word: f64,
}

/// Speaking time with half of the silence added back, so excluding pauses
/// does not inflate WPM.
pub fn effective_duration_secs(buffer: &AudioBuffer, vad: Option<&VadMetrics>) -> f64 {
    let total = buffer.duration_secs();
    match vad.filter(|v| v.has_segments()) {
        Some(v) => {
            let speech = (v.total_speech_time / 1000.0).min(total);
            total - (total - speech) / 2.0
        }
        None => total,
    }
}

fn per_minute(count: f64, duration_secs: f64) -> f64 {
    if duration_secs <= 0.0 {
        return 0.0;
    }
    (count / duration_secs * 60.0).round()
}

/// Faster is more energetic; no penalty above `ideal`.
pub fn score_speech_rate(wpm: f64, t: &Thresholds) -> f64 {
    if wpm <= 0.0 || wpm < t.min {
        return 0.0;
    }
    if wpm >= t.ideal {
        return 100.0;
    }
    clamp_score(lerp(wpm, t.min, t.ideal, 0.0, 100.0))
}

/// Estimate WPM from `buffer`.
///
/// `word_count` is `None` for sub-buffer analysis, which always uses the
/// spectral-flux detector since a transcript count cannot be split.
pub fn analyze_speech_rate(
    buffer: &AudioBuffer,
    vad: Option<&VadMetrics>,
    word_count: Option<u32>,
    params: &SpeechRateParams,
) -> SpeechRateResult {
    let duration = effective_duration_secs(buffer, vad);
    let from_syllables = |syllables: usize, method: RateMethodUsed| {
        let words = syllables as f64 / params.syllables_per_word.max(f64::EPSILON);
        (per_minute(words, duration), method, Some(syllables), None::<u32>)
    };
    let flux = || from_syllables(count_flux_onsets(buffer, vad), RateMethodUsed::SpectralFlux);

    let (wpm, method, syllable_count, used_words) = match (params.method, word_count) {
        (_, None) => flux(),
        (SpeechRateMethod::DeepgramStt, Some(n)) if n > 0 => (
            per_minute(n as f64, duration),
            RateMethodUsed::DeepgramStt,
            None,
            Some(n),
        ),
        (SpeechRateMethod::WebSpeechApi, Some(n)) if n > 0 => (
            per_minute(n as f64, duration),
            RateMethodUsed::WebSpeechApi,
            None,
            Some(n),
        ),
        (SpeechRateMethod::DeepgramStt | SpeechRateMethod::WebSpeechApi, Some(_)) => {
            debug!("no transcript words, falling back to spectral flux");
            flux()
        }
        (SpeechRateMethod::SpectralFlux, Some(_)) => flux(),
        (SpeechRateMethod::EnergyPeaks, Some(_)) => match vad.filter(|v| v.has_segments()) {
            Some(v) => from_syllables(count_energy_peaks(buffer, Some(v)), RateMethodUsed::VadEnhanced),
            None => from_syllables(count_energy_peaks(buffer, None), RateMethodUsed::EnergyPeaks),
        },
    };

    let score = score_speech_rate(wpm, &params.thresholds);
    debug!(wpm, ?method, duration, score, "speech rate analyzed");
    SpeechRateResult {
        words_per_minute: wpm,
        method,
        syllable_count,
        word_count: used_words,
        effective_duration_secs: duration,
        score,
    }
}
