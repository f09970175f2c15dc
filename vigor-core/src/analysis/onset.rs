//! Syllable onset counting without speech recognition.
//!
//! ## Spectral flux
//!
//! ```text
//! 20 ms frames, 10 ms hop ─► Hann window ─► 256-bin direct DFT ─► |X_t(k)|
//!     flux_t = Σ_k max(0, |X_t(k)| - |X_{t-1}(k)|)
//!     keep frames inside VAD speech (if any)
//!     threshold = max(median·1.5, p75·0.5)
//!     peaks: local maxima > threshold, ≥ 4 frames apart
//! ```
//!
//! The DFT is evaluated directly from precomputed cosine/sine tables, one
//! multiply-add per bin per sample. At 20 ms frames over a few seconds of
//! audio this is cheap enough that an FFT dependency buys nothing.
//!
//! ## Energy peaks
//!
//! A 20 ms RMS envelope with 10 ms hop; local maxima above
//! `max(mean·1.2, 0.01)` at least 100 ms apart. Used by the `energy-peaks`
//! method, VAD-gated when segments are available.

use std::f64::consts::PI;

use crate::audio::{rms, samples_for_ms, AudioBuffer};
use crate::vad::VadMetrics;

pub const FRAME_MS: f64 = 20.0;
pub const HOP_MS: f64 = 10.0;
pub const NUM_BINS: usize = 256;
/// Minimum spacing between accepted flux peaks, in frames (40 ms).
pub const MIN_PEAK_SPACING_FRAMES: usize = 4;

const MEDIAN_FACTOR: f64 = 1.5;
const P75_FACTOR: f64 = 0.5;

const ENERGY_MEAN_FACTOR: f64 = 1.2;
const ENERGY_MIN_THRESHOLD: f64 = 0.01;
const ENERGY_MIN_SPACING_MS: f64 = 100.0;

/// One analysis frame's position and value.
#[derive(Debug, Clone, Copy, PartialEq)]
struct FramePoint {
    index: usize,
    value: f64,
}

/// Precomputed Hann window and DFT basis for one frame size.
struct DftTables {
    window: Vec<f64>,
    /// `cos[k * frame_len + n]`
    cos: Vec<f64>,
    sin: Vec<f64>,
    frame_len: usize,
}

impl DftTables {
    fn new(frame_len: usize) -> Self {
        let window = (0..frame_len)
            .map(|n| {
                if frame_len <= 1 {
                    1.0
                } else {
                    0.5 - 0.5 * (2.0 * PI * n as f64 / (frame_len - 1) as f64).cos()
                }
            })
            .collect();

        let mut cos = Vec::with_capacity(NUM_BINS * frame_len);
        let mut sin = Vec::with_capacity(NUM_BINS * frame_len);
        for k in 0..NUM_BINS {
            // Bins spread evenly from DC to Nyquist.
            let omega = PI * k as f64 / NUM_BINS as f64;
            for n in 0..frame_len {
                let phase = omega * n as f64;
                cos.push(phase.cos());
                sin.push(phase.sin());
            }
        }

        Self {
            window,
            cos,
            sin,
            frame_len,
        }
    }

    fn magnitudes(&self, frame: &[f32], out: &mut [f64]) {
        for (k, slot) in out.iter_mut().enumerate() {
            let base = k * self.frame_len;
            let mut re = 0.0;
            let mut im = 0.0;
            for (n, &s) in frame.iter().enumerate() {
                let x = s as f64 * self.window[n];
                re += x * self.cos[base + n];
                im -= x * self.sin[base + n];
            }
            *slot = (re * re + im * im).sqrt();
        }
    }
}

fn frame_geometry(sample_rate: u32) -> (usize, usize) {
    let frame = samples_for_ms(FRAME_MS, sample_rate).max(1);
    let hop = samples_for_ms(HOP_MS, sample_rate).max(1);
    (frame, hop)
}

/// Number of full frames that fit, at least one for any non-empty buffer.
fn frame_count(len: usize, frame: usize, hop: usize) -> usize {
    if len == 0 {
        0
    } else if len < frame {
        1
    } else {
        (len - frame) / hop + 1
    }
}

fn frame_center_ms(index: usize, frame: usize, hop: usize, sample_rate: u32) -> f64 {
    let center = index * hop + frame / 2;
    center as f64 * 1000.0 / sample_rate.max(1) as f64
}

/// Half-wave-rectified spectral flux per frame.
pub fn spectral_flux(buffer: &AudioBuffer) -> Vec<f64> {
    let (frame, hop) = frame_geometry(buffer.sample_rate);
    let count = frame_count(buffer.samples.len(), frame, hop);
    if count == 0 {
        return Vec::new();
    }

    let tables = DftTables::new(frame);
    let mut prev = vec![0.0f64; NUM_BINS];
    let mut current = vec![0.0f64; NUM_BINS];
    let mut flux = Vec::with_capacity(count);

    for i in 0..count {
        let start = i * hop;
        let end = (start + frame).min(buffer.samples.len());
        tables.magnitudes(&buffer.samples[start..end], &mut current);
        let f: f64 = current
            .iter()
            .zip(prev.iter())
            .map(|(c, p)| (c - p).max(0.0))
            .sum();
        flux.push(f);
        std::mem::swap(&mut prev, &mut current);
    }
    flux
}

/// Keep only frames whose centre lies inside a speech segment.
fn gate_by_vad(
    values: Vec<f64>,
    vad: Option<&VadMetrics>,
    frame: usize,
    hop: usize,
    sample_rate: u32,
) -> Vec<FramePoint> {
    let points = values
        .into_iter()
        .enumerate()
        .map(|(index, value)| FramePoint { index, value });
    match vad.filter(|v| v.has_segments()) {
        Some(vad) => points
            .filter(|p| vad.is_speech_at(frame_center_ms(p.index, frame, hop, sample_rate)))
            .collect(),
        None => points.collect(),
    }
}

/// Value at quantile `q` of an ascending-sorted slice (nearest rank, floor).
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * q).floor() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn sorted_values(points: &[FramePoint]) -> Vec<f64> {
    let mut v: Vec<f64> = points.iter().map(|p| p.value).collect();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

/// Count local maxima strictly above `threshold`, spaced by `min_spacing`
/// original frame indices. Neighbours are taken from the kept series.
fn count_peaks(points: &[FramePoint], threshold: f64, min_spacing: usize) -> usize {
    let mut peaks = 0usize;
    let mut last_peak: Option<usize> = None;
    for i in 0..points.len() {
        let p = points[i];
        if p.value <= threshold {
            continue;
        }
        let left = if i > 0 { points[i - 1].value } else { f64::MIN };
        let right = points.get(i + 1).map_or(f64::MIN, |n| n.value);
        if p.value < left || p.value <= right {
            continue;
        }
        if let Some(last) = last_peak {
            if p.index - last < min_spacing {
                continue;
            }
        }
        peaks += 1;
        last_peak = Some(p.index);
    }
    peaks
}

/// Syllable estimate from spectral-flux onsets. At least 1 when any frame
/// survives VAD gating, 0 otherwise.
pub fn count_flux_onsets(buffer: &AudioBuffer, vad: Option<&VadMetrics>) -> usize {
    let (frame, hop) = frame_geometry(buffer.sample_rate);
    let flux = spectral_flux(buffer);
    let kept = gate_by_vad(flux, vad, frame, hop, buffer.sample_rate);
    if kept.is_empty() {
        return 0;
    }

    let sorted = sorted_values(&kept);
    let threshold = (quantile(&sorted, 0.5) * MEDIAN_FACTOR).max(quantile(&sorted, 0.75) * P75_FACTOR);
    count_peaks(&kept, threshold, MIN_PEAK_SPACING_FRAMES).max(1)
}

/// Syllable estimate from RMS-envelope peaks, VAD-gated when segments exist.
pub fn count_energy_peaks(buffer: &AudioBuffer, vad: Option<&VadMetrics>) -> usize {
    let (frame, hop) = frame_geometry(buffer.sample_rate);
    let count = frame_count(buffer.samples.len(), frame, hop);
    let envelope: Vec<f64> = (0..count)
        .map(|i| {
            let start = i * hop;
            let end = (start + frame).min(buffer.samples.len());
            rms(&buffer.samples[start..end])
        })
        .collect();

    let kept = gate_by_vad(envelope, vad, frame, hop, buffer.sample_rate);
    if kept.is_empty() {
        return 0;
    }

    let mean = kept.iter().map(|p| p.value).sum::<f64>() / kept.len() as f64;
    let threshold = (mean * ENERGY_MEAN_FACTOR).max(ENERGY_MIN_THRESHOLD);
    let spacing = (ENERGY_MIN_SPACING_MS / HOP_MS).round() as usize;
    count_peaks(&kept, threshold, spacing).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vad::VadSegment;

    const RATE: u32 = 16_000;

    /// `bursts` tone bursts of 60 ms, one every `period_ms`, at 1 kHz.
    fn bursts(count: usize, period_ms: f64, total_secs: f64) -> AudioBuffer {
        let n = (total_secs * RATE as f64) as usize;
        let mut samples = vec![0.0f32; n];
        let burst = samples_for_ms(60.0, RATE);
        for b in 0..count {
            let start = samples_for_ms(100.0 + b as f64 * period_ms, RATE);
            for i in 0..burst {
                if let Some(s) = samples.get_mut(start + i) {
                    *s = 0.5 * (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / RATE as f32).sin();
                }
            }
        }
        AudioBuffer::new(samples, RATE)
    }

    #[test]
    fn flux_finds_every_burst_onset() {
        // Hard burst edges can add one offset peak per burst at most.
        let n = count_flux_onsets(&bursts(6, 250.0, 2.0), None);
        assert!((6..=12).contains(&n), "counted {n}");
        assert!(n > count_flux_onsets(&bursts(2, 250.0, 2.0), None));
    }

    #[test]
    fn flux_is_non_negative() {
        let buf = bursts(3, 300.0, 1.2);
        assert!(spectral_flux(&buf).iter().all(|f| *f >= 0.0));
    }

    #[test]
    fn silence_floors_at_one() {
        let buf = AudioBuffer::new(vec![0.0; RATE as usize], RATE);
        assert_eq!(count_flux_onsets(&buf, None), 1);
        assert_eq!(count_energy_peaks(&buf, None), 1);
    }

    #[test]
    fn empty_buffer_counts_zero() {
        let buf = AudioBuffer::new(vec![], RATE);
        assert_eq!(count_flux_onsets(&buf, None), 0);
        assert_eq!(count_energy_peaks(&buf, None), 0);
    }

    #[test]
    fn vad_gating_drops_bursts_outside_speech() {
        // Bursts start at 100, 350, 600, 850 ms; speech only covers the first two.
        let buf = bursts(4, 250.0, 1.2);
        let vad = VadMetrics::from_segments(vec![VadSegment::new(50.0, 500.0)], 1200.0);
        let gated = count_flux_onsets(&buf, Some(&vad));
        assert!((2..=4).contains(&gated), "counted {gated}");
        assert!(gated < count_flux_onsets(&buf, None));
        assert_eq!(count_energy_peaks(&buf, Some(&vad)), 2);
    }

    #[test]
    fn vad_without_segments_is_ignored() {
        let buf = bursts(4, 250.0, 1.2);
        let vad = VadMetrics::from_segments(vec![], 1200.0);
        assert_eq!(count_flux_onsets(&buf, Some(&vad)), count_flux_onsets(&buf, None));
    }

    #[test]
    fn energy_peaks_count_bursts() {
        let buf = bursts(5, 250.0, 1.6);
        assert_eq!(count_energy_peaks(&buf, None), 5);
    }

    #[test]
    fn peak_spacing_is_enforced() {
        let pts: Vec<FramePoint> = [0.0, 5.0, 0.0, 5.0, 0.0, 0.0, 0.0, 5.0, 0.0]
            .iter()
            .enumerate()
            .map(|(index, &value)| FramePoint { index, value })
            .collect();
        // Peaks at 1, 3, 7; 3 is only 2 frames after 1.
        assert_eq!(count_peaks(&pts, 1.0, 4), 2);
    }

    #[test]
    fn quantile_uses_floor_rank() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile(&v, 0.5), 3.0);
        assert_eq!(quantile(&v, 0.75), 4.0);
    }
}
