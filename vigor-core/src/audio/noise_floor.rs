//! Noise-floor estimation over the leading 100 ms of a recording.
//!
//! The floor serves two callers: the calibration wizard stores it in dB
//! (treated as LUFS-comparable), and the response-latency detector turns it
//! back into a linear onset threshold.

use super::{amplitude_to_db, rms, AudioBuffer};

/// Window measured from the start of the buffer.
pub const NOISE_WINDOW_MS: f64 = 100.0;
/// Multiplier applied to the linear floor to get an onset threshold.
pub const ONSET_FACTOR: f64 = 3.0;
/// Lowest onset threshold in linear amplitude.
pub const MIN_ONSET_THRESHOLD: f64 = 0.005;

/// RMS of the first `min(100 ms, len)` samples.
pub fn leading_rms(buffer: &AudioBuffer) -> f64 {
    let n = buffer.samples_for_ms(NOISE_WINDOW_MS);
    rms(&buffer.samples[..n])
}

/// Noise floor in dB: `20·log10(max(rms, 1e-10))`.
pub fn estimate_noise_floor_db(buffer: &AudioBuffer) -> f64 {
    amplitude_to_db(leading_rms(buffer))
}

/// Linear-domain threshold for the first audible sample.
pub fn onset_threshold(buffer: &AudioBuffer) -> f64 {
    (leading_rms(buffer) * ONSET_FACTOR).max(MIN_ONSET_THRESHOLD)
}
