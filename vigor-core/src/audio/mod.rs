//! Immutable PCM buffers and the level measurements built on them.
//!
//! Every analyzer receives an [`AudioBuffer`] (or a borrowed slice of one)
//! and never mutates it. Gain stages produce a new buffer.

pub mod loudness;
pub mod noise_floor;

pub use loudness::{calculate_lufs, normalize_to_lufs};
pub use noise_floor::{estimate_noise_floor_db, onset_threshold};

/// Smallest RMS value fed into `log10`, keeps dB conversions finite.
pub const MIN_RMS: f64 = 1e-10;

/// A contiguous block of mono PCM samples at a known sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g. 16000, 44100, 48000).
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Returns the duration of this buffer in seconds (0 for a zero sample rate).
    pub fn duration_secs(&self) -> f64 {
        duration_secs(self.samples.len(), self.sample_rate)
    }

    /// Returns the duration of this buffer in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        self.duration_secs() * 1000.0
    }

    /// Returns true if the buffer contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of samples covering `ms` milliseconds, capped at the buffer length.
    pub fn samples_for_ms(&self, ms: f64) -> usize {
        samples_for_ms(ms, self.sample_rate).min(self.samples.len())
    }

    /// Return a new buffer scaled by `gain` and hard-clipped to [-1, 1].
    pub fn with_gain(&self, gain: f64) -> Self {
        Self::new(apply_gain(&self.samples, gain), self.sample_rate)
    }

    /// Split at the midpoint sample. The second half receives the odd sample.
    pub fn split_half(&self) -> (AudioBuffer, AudioBuffer) {
        let mid = self.samples.len() / 2;
        (
            Self::new(self.samples[..mid].to_vec(), self.sample_rate),
            Self::new(self.samples[mid..].to_vec(), self.sample_rate),
        )
    }
}

pub fn duration_secs(len: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    len as f64 / sample_rate as f64
}

pub fn samples_for_ms(ms: f64, sample_rate: u32) -> usize {
    (ms / 1000.0 * sample_rate as f64).round().max(0.0) as usize
}

/// Compute the root-mean-square of a sample slice.
pub fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    mean_square(samples).sqrt()
}

pub fn mean_square(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    sum_sq / samples.len() as f64
}

/// Mean absolute amplitude, used by frame-energy silence detection.
pub fn mean_abs(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|&s| (s as f64).abs()).sum::<f64>() / samples.len() as f64
}

/// Linear amplitude to dBFS with a floor at [`MIN_RMS`].
pub fn amplitude_to_db(amplitude: f64) -> f64 {
    20.0 * amplitude.max(MIN_RMS).log10()
}

pub fn db_to_gain(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

pub fn apply_gain(samples: &[f32], gain: f64) -> Vec<f32> {
    samples
        .iter()
        .map(|&s| ((s as f64) * gain).clamp(-1.0, 1.0) as f32)
        .collect()
}
