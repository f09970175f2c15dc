//! Two-phase calibration wizard.
//!
//! ```text
//! New ──capture_silence──► SilenceCaptured ──capture_speech──► SpeechCaptured ──finish──► profile
//! ```
//!
//! Phase 1 measures the room's noise floor from a few seconds of silence.
//! Phase 2 measures the user's natural speaking loudness. The host drives
//! the UI; this type only validates order and measurements.

use tracing::info;

use super::{CalibrationProfile, CalibrationStore, DEFAULT_TARGET_LUFS};
use crate::audio::{calculate_lufs, estimate_noise_floor_db, AudioBuffer};
use crate::error::{Result, VigorError};

/// Minimum separation between the speech reference and the noise floor.
pub const MIN_SPEECH_MARGIN_DB: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    New,
    SilenceCaptured { noise_floor: f64 },
    SpeechCaptured { noise_floor: f64, reference_level: f64 },
}

#[derive(Debug, Clone)]
pub struct CalibrationWizard {
    phase: Phase,
    target_lufs: f64,
}

impl Default for CalibrationWizard {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_LUFS)
    }
}

impl CalibrationWizard {
    pub fn new(target_lufs: f64) -> Self {
        Self {
            phase: Phase::New,
            target_lufs,
        }
    }

    /// Phase 1: measure the noise floor (dB) of a silent recording.
    pub fn capture_silence(&mut self, buffer: &AudioBuffer) -> Result<f64> {
        if buffer.is_empty() {
            return Err(VigorError::Calibration("silence recording is empty".into()));
        }
        let noise_floor = estimate_noise_floor_db(buffer);
        self.phase = Phase::SilenceCaptured { noise_floor };
        info!(noise_floor, "calibration silence captured");
        Ok(noise_floor)
    }

    /// Phase 2: measure the reference speaking level (LUFS).
    pub fn capture_speech(&mut self, buffer: &AudioBuffer) -> Result<f64> {
        let noise_floor = match self.phase {
            Phase::New => {
                return Err(VigorError::Calibration(
                    "capture silence before speech".into(),
                ))
            }
            Phase::SilenceCaptured { noise_floor } | Phase::SpeechCaptured { noise_floor, .. } => {
                noise_floor
            }
        };

        let reference_level = calculate_lufs(buffer);
        if !reference_level.is_finite() {
            return Err(VigorError::Calibration("no speech detected".into()));
        }
        if reference_level - noise_floor < MIN_SPEECH_MARGIN_DB {
            return Err(VigorError::Calibration(format!(
                "speech ({reference_level:.1} LUFS) is too close to the noise floor ({noise_floor:.1} dB)"
            )));
        }

        self.phase = Phase::SpeechCaptured {
            noise_floor,
            reference_level,
        };
        info!(reference_level, "calibration speech captured");
        Ok(reference_level)
    }

    /// Create and persist the profile from both measurements.
    pub fn finish(
        &self,
        store: &CalibrationStore,
        device_id: &str,
        label: &str,
    ) -> Result<CalibrationProfile> {
        match self.phase {
            Phase::SpeechCaptured {
                noise_floor,
                reference_level,
            } => store.create_profile(device_id, label, noise_floor, reference_level, self.target_lufs),
            _ => Err(VigorError::Calibration(
                "both calibration phases must complete first".into(),
            )),
        }
    }
}
