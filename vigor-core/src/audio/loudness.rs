//! Gated integrated loudness, a simplified ITU-R BS.1770 meter.
//!
//! ## Algorithm
//!
//! 1. Slice the buffer into 400 ms blocks with a 100 ms hop (75 % overlap).
//!    A non-empty buffer shorter than one block is measured as one block.
//! 2. Mean-square per block. K-weighting is approximated as identity, so the
//!    result is an unweighted RMS loudness, not a certified LUFS reading.
//! 3. Absolute gate: drop blocks below -70 LUFS (`10^(-70/10)` mean-square).
//! 4. Relative gate: drop blocks more than 10 dB below the mean of the
//!    survivors.
//! 5. `-0.691 + 10·log10(mean of remaining blocks)`.
//!
//! Silence and empty input measure `-Infinity`.

use super::{apply_gain, db_to_gain, mean_square, samples_for_ms, AudioBuffer};

pub const BLOCK_MS: f64 = 400.0;
pub const HOP_MS: f64 = 100.0;
/// Absolute gate in LUFS.
pub const ABSOLUTE_GATE_LUFS: f64 = -70.0;
/// Relative gate in LU below the ungated mean.
pub const RELATIVE_GATE_LU: f64 = -10.0;
const LUFS_OFFSET: f64 = -0.691;

/// Mean-square energy of each gating block.
fn block_energies(samples: &[f32], sample_rate: u32) -> Vec<f64> {
    if samples.is_empty() {
        return Vec::new();
    }
    let block = samples_for_ms(BLOCK_MS, sample_rate).max(1);
    let hop = samples_for_ms(HOP_MS, sample_rate).max(1);

    if samples.len() < block {
        return vec![mean_square(samples)];
    }

    let mut energies = Vec::with_capacity((samples.len() - block) / hop + 1);
    let mut start = 0usize;
    while start + block <= samples.len() {
        energies.push(mean_square(&samples[start..start + block]));
        start += hop;
    }
    energies
}

/// Integrated loudness of `samples` in LUFS.
pub fn lufs_of(samples: &[f32], sample_rate: u32) -> f64 {
    let energies = block_energies(samples, sample_rate);

    let absolute_gate = 10f64.powf(ABSOLUTE_GATE_LUFS / 10.0);
    let gated: Vec<f64> = energies
        .into_iter()
        .filter(|&e| e >= absolute_gate)
        .collect();
    if gated.is_empty() {
        return f64::NEG_INFINITY;
    }

    let average = gated.iter().sum::<f64>() / gated.len() as f64;
    let relative_gate = average * 10f64.powf(RELATIVE_GATE_LU / 10.0);
    let kept: Vec<f64> = gated.into_iter().filter(|&e| e >= relative_gate).collect();
    if kept.is_empty() {
        return f64::NEG_INFINITY;
    }

    let mean = kept.iter().sum::<f64>() / kept.len() as f64;
    LUFS_OFFSET + 10.0 * mean.log10()
}

/// Integrated loudness of a buffer in LUFS.
pub fn calculate_lufs(buffer: &AudioBuffer) -> f64 {
    lufs_of(&buffer.samples, buffer.sample_rate)
}

/// Scale a buffer so its integrated loudness lands on `target_lufs`.
///
/// Returns the new buffer and the linear gain applied. Silent input is
/// returned unchanged with a gain of 1.
pub fn normalize_to_lufs(buffer: &AudioBuffer, target_lufs: f64) -> (AudioBuffer, f64) {
    let current = calculate_lufs(buffer);
    if !current.is_finite() {
        return (buffer.clone(), 1.0);
    }
    let gain = db_to_gain(target_lufs - current);
    (
        AudioBuffer::new(apply_gain(&buffer.samples, gain), buffer.sample_rate),
        gain,
    )
}

/// Serde adapter for LUFS readings.
///
/// JSON has no `-Infinity`; silent readings are written as `null` and read
/// back as `-Infinity`.
pub mod lufs_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NEG_INFINITY))
    }
}
