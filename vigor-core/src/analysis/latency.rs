//! Response latency: time until the first sample rises above the noise floor.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{clamp_score, lerp};
use crate::audio::{onset_threshold, AudioBuffer};
use crate::config::Thresholds;

/// Milliseconds past `max` over which the score decays from 50 to 0.
const DECAY_MS: f64 = 3000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseTimeResult {
    pub response_time_ms: f64,
    pub threshold_amplitude: f64,
    pub score: f64,
}

impl ResponseTimeResult {
    pub fn zero() -> Self {
        Self {
            response_time_ms: 0.0,
            threshold_amplitude: 0.0,
            score: 0.0,
        }
    }
}

/// Quicker responses score higher.
pub fn score_response_time(ms: f64, t: &Thresholds) -> f64 {
    let raw = if ms <= t.ideal {
        100.0
    } else if ms <= t.max {
        lerp(ms, t.ideal, t.max, 100.0, 50.0)
    } else {
        (50.0 * (1.0 - (ms - t.max) / DECAY_MS)).clamp(0.0, 50.0)
    };
    clamp_score(raw)
}

/// Latency to the first sample louder than the adaptive onset threshold.
/// A buffer that never crosses it reports its full duration.
pub fn analyze_response_time(buffer: &AudioBuffer, t: &Thresholds) -> ResponseTimeResult {
    if buffer.is_empty() || buffer.sample_rate == 0 {
        return ResponseTimeResult::zero();
    }

    let threshold = onset_threshold(buffer);
    let index = buffer
        .samples
        .iter()
        .position(|s| (*s as f64).abs() > threshold)
        .unwrap_or(buffer.samples.len());
    let response_time_ms = (index as f64 / buffer.sample_rate as f64 * 1000.0).round();
    let score = score_response_time(response_time_ms, t);

    debug!(response_time_ms, threshold, score, "response time analyzed");
    ResponseTimeResult {
        response_time_ms,
        threshold_amplitude: threshold,
        score,
    }
}
