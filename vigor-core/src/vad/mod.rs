//! Voice Activity Detection (VAD) data model and detector abstraction.
//!
//! The engine consumes [`VadMetrics`] produced before analysis starts. In a
//! host application they normally come from an external detector; the
//! `VoiceActivityDetector` trait plus [`segment_buffer`] let any frame-level
//! detector (the bundled `EnergyVad`, or a neural VAD) produce them.

pub mod energy;

pub use energy::EnergyVad;

use serde::{Deserialize, Serialize};

use crate::audio::{samples_for_ms, AudioBuffer};

/// Frame stride used by [`segment_buffer`].
pub const DEFAULT_FRAME_MS: f64 = 20.0;

/// Whether a given audio frame contains speech or silence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadDecision {
    /// The frame contains speech energy above threshold.
    Speech,
    /// The frame is silent (or below threshold, including hangover period).
    Silence,
}

impl VadDecision {
    pub fn is_speech(self) -> bool {
        self == VadDecision::Speech
    }
}

/// Trait for all VAD implementations.
///
/// Implementors may be stateful (hangover counters, RNN hidden states, etc.).
pub trait VoiceActivityDetector: Send + 'static {
    /// Analyse one frame and return a speech/silence decision.
    fn classify(&mut self, frame: &AudioBuffer) -> VadDecision;

    /// Reset any internal state (e.g. hangover counters, hidden states).
    fn reset(&mut self);
}

/// One contiguous speech region, in milliseconds from the buffer start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VadSegment {
    pub start: f64,
    pub end: f64,
    pub duration: f64,
}

impl VadSegment {
    pub fn new(start: f64, end: f64) -> Self {
        Self {
            start,
            end,
            duration: (end - start).max(0.0),
        }
    }

    pub fn contains(&self, ms: f64) -> bool {
        ms >= self.start && ms < self.end
    }
}

/// Speech/silence summary of one recording.
///
/// Invariants: `total_speech_time == Σ segment.duration` and
/// `speech_ratio == total_speech_time / (total_speech_time + total_silence_time)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VadMetrics {
    pub segments: Vec<VadSegment>,
    pub total_speech_time: f64,
    pub total_silence_time: f64,
    pub speech_ratio: f64,
    pub is_speaking: bool,
    pub speech_probability: f64,
}

impl VadMetrics {
    /// Derive totals from segments over a recording of `total_ms`.
    pub fn from_segments(segments: Vec<VadSegment>, total_ms: f64) -> Self {
        let total_speech_time: f64 = segments.iter().map(|s| s.duration).sum();
        let total_silence_time = (total_ms - total_speech_time).max(0.0);
        let denom = total_speech_time + total_silence_time;
        let speech_ratio = if denom > 0.0 {
            total_speech_time / denom
        } else {
            0.0
        };
        Self {
            segments,
            total_speech_time,
            total_silence_time,
            speech_ratio,
            is_speaking: false,
            speech_probability: speech_ratio,
        }
    }

    pub fn has_segments(&self) -> bool {
        !self.segments.is_empty()
    }

    /// Whether `ms` falls inside any speech segment.
    pub fn is_speech_at(&self, ms: f64) -> bool {
        self.segments.iter().any(|s| s.contains(ms))
    }

    /// Split into two windows at `mid_ms` of a recording lasting `total_ms`.
    ///
    /// Segments crossing the midpoint are cut in two. Second-half segments
    /// are re-based so they start relative to `mid_ms`.
    pub fn split_at(&self, mid_ms: f64, total_ms: f64) -> (VadMetrics, VadMetrics) {
        let first: Vec<VadSegment> = self
            .segments
            .iter()
            .filter(|s| s.start < mid_ms)
            .map(|s| VadSegment::new(s.start, s.end.min(mid_ms)))
            .collect();
        let second: Vec<VadSegment> = self
            .segments
            .iter()
            .filter(|s| s.end > mid_ms)
            .map(|s| VadSegment::new(s.start.max(mid_ms) - mid_ms, s.end - mid_ms))
            .collect();

        let mut a = VadMetrics::from_segments(first, mid_ms);
        let mut b = VadMetrics::from_segments(second, (total_ms - mid_ms).max(0.0));
        a.speech_probability = self.speech_probability;
        b.speech_probability = self.speech_probability;
        b.is_speaking = self.is_speaking;
        (a, b)
    }
}

/// Run `detector` over `buffer` in `frame_ms` frames and fold the decisions
/// into [`VadMetrics`]. Adjacent speech frames merge into one segment.
pub fn segment_buffer(
    detector: &mut dyn VoiceActivityDetector,
    buffer: &AudioBuffer,
    frame_ms: f64,
) -> VadMetrics {
    detector.reset();
    let frame_len = samples_for_ms(frame_ms, buffer.sample_rate).max(1);
    let total_ms = buffer.duration_ms();
    let ms_per_sample = if buffer.sample_rate == 0 {
        0.0
    } else {
        1000.0 / buffer.sample_rate as f64
    };

    let mut segments = Vec::new();
    let mut open: Option<f64> = None;
    let mut speech_frames = 0usize;
    let mut frames = 0usize;
    let mut last = VadDecision::Silence;

    for (idx, chunk) in buffer.samples.chunks(frame_len).enumerate() {
        let start_ms = (idx * frame_len) as f64 * ms_per_sample;
        let frame = AudioBuffer::new(chunk.to_vec(), buffer.sample_rate);
        let decision = detector.classify(&frame);
        frames += 1;
        last = decision;
        match (decision, open) {
            (VadDecision::Speech, None) => open = Some(start_ms),
            (VadDecision::Silence, Some(seg_start)) => {
                segments.push(VadSegment::new(seg_start, start_ms));
                open = None;
            }
            _ => {}
        }
        if decision.is_speech() {
            speech_frames += 1;
        }
    }
    if let Some(seg_start) = open {
        segments.push(VadSegment::new(seg_start, total_ms));
    }

    let mut metrics = VadMetrics::from_segments(segments, total_ms);
    metrics.is_speaking = last.is_speech();
    metrics.speech_probability = if frames == 0 {
        0.0
    } else {
        speech_frames as f64 / frames as f64
    };
    metrics
}
