//! Acceleration: does the delivery get louder or faster towards the end?
//!
//! The buffer is cut at its midpoint sample and the loudness meter plus the
//! speech-rate estimator are re-run on each half. The rate estimator is
//! called without a word count so it always uses spectral flux.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::clamp_score;
use super::speech_rate::{analyze_speech_rate, SpeechRateParams};
use crate::audio::loudness::{lufs_serde, ABSOLUTE_GATE_LUFS};
use crate::audio::{calculate_lufs, AudioBuffer};
use crate::vad::VadMetrics;

/// Rate increase (WPM) that alone counts as accelerating.
const RATE_DELTA_TRIGGER: f64 = 5.0;
const VOLUME_FACTOR: f64 = 2.0;
const RATE_FACTOR: f64 = 0.5;
const BASELINE_SCORE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HalfMeasurement {
    #[serde(with = "lufs_serde")]
    pub volume_db: f64,
    pub words_per_minute: f64,
}

impl HalfMeasurement {
    fn zero() -> Self {
        Self {
            volume_db: f64::NEG_INFINITY,
            words_per_minute: 0.0,
        }
    }

    /// Loudness as it enters the delta: silence sits on the absolute gate.
    fn gated_volume(&self) -> f64 {
        if self.volume_db.is_finite() {
            self.volume_db
        } else {
            ABSOLUTE_GATE_LUFS
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccelerationResult {
    pub is_accelerating: bool,
    pub acceleration_factor: f64,
    pub first_half: HalfMeasurement,
    pub second_half: HalfMeasurement,
    pub score: f64,
}

impl AccelerationResult {
    pub fn zero() -> Self {
        Self {
            is_accelerating: false,
            acceleration_factor: 0.0,
            first_half: HalfMeasurement::zero(),
            second_half: HalfMeasurement::zero(),
            score: 0.0,
        }
    }
}

fn measure_half(half: &AudioBuffer, vad: Option<&VadMetrics>, params: &SpeechRateParams) -> HalfMeasurement {
    HalfMeasurement {
        volume_db: calculate_lufs(half),
        words_per_minute: analyze_speech_rate(half, vad, None, params).words_per_minute,
    }
}

pub fn analyze_acceleration(
    buffer: &AudioBuffer,
    vad: Option<&VadMetrics>,
    params: &SpeechRateParams,
) -> AccelerationResult {
    let (first, second) = buffer.split_half();
    let mid_ms = first.duration_ms();
    let windows = vad
        .filter(|v| v.has_segments())
        .map(|v| v.split_at(mid_ms, buffer.duration_ms()));
    let (vad_a, vad_b) = match &windows {
        Some((a, b)) => (Some(a), Some(b)),
        None => (None, None),
    };

    let first_half = measure_half(&first, vad_a, params);
    let second_half = measure_half(&second, vad_b, params);

    let volume_delta = second_half.gated_volume() - first_half.gated_volume();
    let rate_delta = second_half.words_per_minute - first_half.words_per_minute;
    let is_accelerating = volume_delta > 0.0 || rate_delta > RATE_DELTA_TRIGGER;
    let acceleration_factor = (volume_delta * VOLUME_FACTOR + rate_delta * RATE_FACTOR).max(0.0);
    let score = clamp_score(BASELINE_SCORE + acceleration_factor);

    debug!(volume_delta, rate_delta, acceleration_factor, score, "acceleration analyzed");
    AccelerationResult {
        is_accelerating,
        acceleration_factor,
        first_half,
        second_half,
        score,
    }
}
