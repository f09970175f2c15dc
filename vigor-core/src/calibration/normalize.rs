//! Device calibration followed by LUFS normalization.
//!
//! ## Dual path
//!
//! ```text
//! raw ──► × gainAdjustment (profile) ──► calibrated ──► × 10^((target-LUFS)/20) ──► normalized
//!  │
//!  └──► raw LUFS + (target - referenceLevel) ──► volume scoring only
//! ```
//!
//! Tempo, dynamics, pause and latency analysis read the normalized buffer.
//! Volume scoring reads the raw loudness shifted by the device offset, so a
//! genuinely loud delivery still scores louder than a quiet one.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CalibrationStore, RecordingStats};
use crate::audio::loudness::lufs_serde;
use crate::audio::{calculate_lufs, estimate_noise_floor_db, normalize_to_lufs, AudioBuffer};

/// Result of [`Normalizer::calibrate_and_normalize`].
#[derive(Debug, Clone)]
pub struct NormalizationOutcome {
    pub buffer: AudioBuffer,
    pub diagnostics: NormalizationDiagnostics,
}

/// Loudness readings along the normalization chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationDiagnostics {
    #[serde(rename = "originalLUFS", with = "lufs_serde")]
    pub original_lufs: f64,
    #[serde(rename = "calibratedLUFS", with = "lufs_serde")]
    pub calibrated_lufs: f64,
    #[serde(rename = "finalLUFS", with = "lufs_serde")]
    pub final_lufs: f64,
    #[serde(rename = "deviceGain")]
    pub device_gain: f64,
    #[serde(rename = "normalizationGain")]
    pub normalization_gain: f64,
}

/// Applies a device's calibration, then normalizes to the target loudness.
#[derive(Debug, Clone)]
pub struct Normalizer {
    store: Arc<CalibrationStore>,
    target_lufs: f64,
}

impl Normalizer {
    pub fn new(store: Arc<CalibrationStore>, target_lufs: f64) -> Self {
        Self { store, target_lufs }
    }

    pub fn target_lufs(&self) -> f64 {
        self.target_lufs
    }

    /// Calibrate with the device profile (if any), normalize, and append a
    /// [`RecordingStats`] entry to that profile's history.
    pub fn calibrate_and_normalize(
        &self,
        buffer: &AudioBuffer,
        device_id: Option<&str>,
    ) -> NormalizationOutcome {
        let profile = device_id.and_then(|id| self.store.get_profile(id));
        let device_gain = profile.as_ref().map_or(1.0, |p| p.gain_adjustment);

        let original_lufs = calculate_lufs(buffer);
        let calibrated = if profile.is_some() {
            buffer.with_gain(device_gain)
        } else {
            buffer.clone()
        };
        let calibrated_lufs = calculate_lufs(&calibrated);

        // normalize_to_lufs leaves silent input untouched with unity gain.
        let (normalized, normalization_gain) = normalize_to_lufs(&calibrated, self.target_lufs);
        let final_lufs = calculate_lufs(&normalized);

        debug!(
            device_id = device_id.unwrap_or("-"),
            original_lufs, calibrated_lufs, final_lufs, device_gain, normalization_gain,
            "buffer normalized"
        );

        if let (Some(id), Some(_)) = (device_id, profile.as_ref()) {
            self.store.record_stats(
                id,
                RecordingStats {
                    timestamp: Utc::now(),
                    original_lufs,
                    calibrated_lufs,
                    final_lufs,
                    noise_floor: estimate_noise_floor_db(buffer),
                },
            );
        }

        NormalizationOutcome {
            buffer: normalized,
            diagnostics: NormalizationDiagnostics {
                original_lufs,
                calibrated_lufs,
                final_lufs,
                device_gain,
                normalization_gain,
            },
        }
    }

    /// dB offset added to raw loudness for volume scoring: `target - referenceLevel`,
    /// or 0 without a profile.
    pub fn device_db_offset(&self, device_id: Option<&str>) -> f64 {
        device_id
            .and_then(|id| self.store.get_profile(id))
            .map_or(0.0, |p| p.device_db_offset(self.target_lufs))
    }
}
