//! Energy-based VAD using RMS threshold + hangover counter.
//!
//! ## Algorithm
//!
//! 1. Compute RMS of the incoming frame.
//! 2. If RMS ≥ `threshold` → emit `Speech`, reset hangover counter.
//! 3. If RMS < `threshold` and hangover counter > 0 → emit `Speech`,
//!    decrement counter (prevents clipping syllable endings).
//! 4. Otherwise → emit `Silence`.

use super::{VadDecision, VoiceActivityDetector};
use crate::audio::{rms, AudioBuffer};

/// A simple energy-based voice activity detector.
#[derive(Debug, Clone)]
pub struct EnergyVad {
    /// RMS amplitude threshold. Frames above this are considered speech.
    threshold: f64,
    /// How many consecutive below-threshold frames to still emit `Speech`
    /// after real speech ends.
    hangover_frames: u32,
    hangover_counter: u32,
}

impl EnergyVad {
    /// Create a new `EnergyVad`.
    ///
    /// # Parameters
    /// - `threshold`: RMS level above which a frame is considered speech.
    ///   Default: `0.02`.
    /// - `hangover_frames`: Number of silent frames to extend speech detection.
    ///   Default: `8` (≈ 160 ms at a 20 ms frame stride).
    pub fn new(threshold: f64, hangover_frames: u32) -> Self {
        Self {
            threshold,
            hangover_frames,
            hangover_counter: 0,
        }
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self::new(0.02, 8)
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn classify(&mut self, frame: &AudioBuffer) -> VadDecision {
        let level = rms(&frame.samples);

        if level >= self.threshold {
            self.hangover_counter = self.hangover_frames;
            VadDecision::Speech
        } else if self.hangover_counter > 0 {
            self.hangover_counter -= 1;
            VadDecision::Speech
        } else {
            VadDecision::Silence
        }
    }

    fn reset(&mut self) {
        self.hangover_counter = 0;
    }
}
