//! Per-metric analyzers and the immutable [`AnalysisResult`] they feed.
//!
//! Every analyzer is a pure function of its inputs (samples, sample rate,
//! optional VAD window, thresholds). None of them touch shared state, which
//! lets the dynamics analyzer re-run the loudness and tempo analyzers on
//! buffer halves without any coordination.

pub mod dynamics;
pub mod latency;
pub mod onset;
pub mod pauses;
pub mod speech_rate;
pub mod volume;

pub use crate::calibration::normalize::NormalizationDiagnostics;
pub use dynamics::{AccelerationResult, HalfMeasurement};
pub use latency::ResponseTimeResult;
pub use pauses::{PauseResult, PauseSource};
pub use speech_rate::{RateMethodUsed, SpeechRateResult};
pub use volume::VolumeResult;

use serde::{Deserialize, Serialize};

/// Three-tier qualitative label attached to the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionalFeedback {
    Excellent,
    Good,
    Poor,
}

impl EmotionalFeedback {
    /// `≥ 70` excellent, `≥ 40` good, otherwise poor.
    pub fn from_score(score: f64) -> Self {
        if score >= 70.0 {
            EmotionalFeedback::Excellent
        } else if score >= 40.0 {
            EmotionalFeedback::Good
        } else {
            EmotionalFeedback::Poor
        }
    }
}

/// Immutable per-recording output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub volume: VolumeResult,
    pub speech_rate: SpeechRateResult,
    pub acceleration: AccelerationResult,
    pub response_time: ResponseTimeResult,
    pub pauses: PauseResult,
    pub overall_score: f64,
    pub emotional_feedback: EmotionalFeedback,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalization: Option<NormalizationDiagnostics>,
}

impl AnalysisResult {
    /// All-zero result returned when VAD confirms there is no speech.
    pub fn no_speech() -> Self {
        Self {
            volume: VolumeResult::silent(),
            speech_rate: SpeechRateResult::zero(),
            acceleration: AccelerationResult::zero(),
            response_time: ResponseTimeResult::zero(),
            pauses: PauseResult::zero(),
            overall_score: 0.0,
            emotional_feedback: EmotionalFeedback::Poor,
            normalization: None,
        }
    }

    pub fn metric_scores(&self) -> [f64; 5] {
        [
            self.volume.score,
            self.speech_rate.score,
            self.acceleration.score,
            self.response_time.score,
            self.pauses.score,
        ]
    }
}

/// Linear interpolation of `x` from `[x0, x1]` onto `[y0, y1]`.
pub(crate) fn lerp(x: f64, x0: f64, x1: f64, y0: f64, y1: f64) -> f64 {
    if (x1 - x0).abs() < f64::EPSILON {
        return y1;
    }
    y0 + (x - x0) / (x1 - x0) * (y1 - y0)
}

/// Round to an integer score and clamp to [0, 100]. NaN scores as 0.
pub(crate) fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        return 0.0;
    }
    score.round().clamp(0.0, 100.0)
}
