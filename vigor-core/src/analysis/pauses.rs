//! Pause ratio, from VAD when available, otherwise from frame energy.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::clamp_score;
use crate::audio::{mean_abs, samples_for_ms, AudioBuffer};
use crate::config::Thresholds;
use crate::vad::VadMetrics;

pub const FRAME_MS: f64 = 50.0;
/// Mean absolute amplitude below which a frame is silent.
pub const SILENCE_THRESHOLD: f64 = 0.01;
/// Pause ratio at or below which the score is 100.
pub const FULL_SCORE_RATIO: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PauseSource {
    Vad,
    Energy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseResult {
    pub pause_ratio: f64,
    pub source: PauseSource,
    pub score: f64,
}

impl PauseResult {
    pub fn zero() -> Self {
        Self {
            pause_ratio: 0.0,
            source: PauseSource::Energy,
            score: 0.0,
        }
    }
}

/// Share of 50 ms frames (the trailing partial one included) that are silent.
pub fn energy_pause_ratio(buffer: &AudioBuffer) -> f64 {
    let frame = samples_for_ms(FRAME_MS, buffer.sample_rate).max(1);
    let (silent, total) = buffer
        .samples
        .chunks(frame)
        .fold((0usize, 0usize), |(silent, total), chunk| {
            let quiet = mean_abs(chunk) < SILENCE_THRESHOLD;
            (silent + usize::from(quiet), total + 1)
        });
    if total == 0 {
        0.0
    } else {
        silent as f64 / total as f64
    }
}

/// Full marks up to [`FULL_SCORE_RATIO`], then a linear drop that reaches 0
/// after `max` more pause ratio. Only `max` is read from the thresholds.
pub fn score_pauses(ratio: f64, t: &Thresholds) -> f64 {
    if ratio <= FULL_SCORE_RATIO {
        return 100.0;
    }
    if t.max <= 0.0 {
        return 0.0;
    }
    clamp_score(100.0 - (ratio - FULL_SCORE_RATIO) / t.max * 100.0)
}

pub fn analyze_pauses(buffer: &AudioBuffer, vad: Option<&VadMetrics>, t: &Thresholds) -> PauseResult {
    let (pause_ratio, source) = match vad {
        Some(v) => ((1.0 - v.speech_ratio).clamp(0.0, 1.0), PauseSource::Vad),
        None => (energy_pause_ratio(buffer), PauseSource::Energy),
    };
    let score = score_pauses(pause_ratio, t);
    debug!(pause_ratio, ?source, score, "pauses analyzed");
    PauseResult {
        pause_ratio,
        source,
        score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vad::VadSegment;
    use approx::assert_relative_eq;

    const RATE: u32 = 16_000;
    const T: Thresholds = Thresholds::new(0.0, 0.1, 2.71);

    #[test]
    fn vad_ratio_is_preferred() {
        let vad = VadMetrics::from_segments(vec![VadSegment::new(0.0, 600.0)], 1000.0);
        let buf = AudioBuffer::new(vec![0.5; RATE as usize], RATE);
        let r = analyze_pauses(&buf, Some(&vad), &T);
        assert_eq!(r.source, PauseSource::Vad);
        assert_relative_eq!(r.pause_ratio, 0.4, epsilon = 1e-9);
        // 100 - 0.3 / 2.71 * 100 = 88.93
        assert_eq!(r.score, 89.0);
    }

    #[test]
    fn energy_fallback_counts_partial_frame() {
        // 4 loud frames, 3 silent frames and a 25 ms silent tail.
        let mut samples = vec![0.2f32; 3_200];
        samples.extend(vec![0.0f32; 2_400 + 400]);
        let buf = AudioBuffer::new(samples, RATE);
        assert_relative_eq!(energy_pause_ratio(&buf), 4.0 / 8.0, epsilon = 1e-9);
        let r = analyze_pauses(&buf, None, &T);
        assert_eq!(r.source, PauseSource::Energy);
    }

    #[test]
    fn empty_buffer_has_no_pauses() {
        assert_eq!(energy_pause_ratio(&AudioBuffer::new(vec![], RATE)), 0.0);
    }

    #[test]
    fn score_curve() {
        assert_eq!(score_pauses(0.0, &T), 100.0);
        assert_eq!(score_pauses(0.1, &T), 100.0);
        assert_eq!(score_pauses(1.0, &T), 67.0);
        assert_eq!(score_pauses(3.0, &T), 0.0);
    }

    #[test]
    fn full_score_cutoff_ignores_configured_ideal() {
        let loose = Thresholds::new(0.0, 0.5, 2.71);
        // 100 - 0.2 / 2.71 * 100 = 92.6
        assert_eq!(score_pauses(0.3, &loose), 93.0);
        assert_eq!(score_pauses(0.3, &loose), score_pauses(0.3, &T));
    }
}
