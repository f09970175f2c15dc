//! Loudness scoring on the raw (uncalibrated) buffer.
//!
//! The measured loudness is shifted by the device offset
//! (`target - referenceLevel`) rather than normalized, so loud deliveries
//! keep scoring higher than quiet ones on every calibrated microphone.
//!
//! ## Curve (louder = more energetic)
//!
//! | dB | score |
//! |----|-------|
//! | `-∞` | 0 |
//! | `< min` | `40 - 2·(min - dB)`, floored at 0 |
//! | `min..ideal` | 40 → 90 |
//! | `ideal..max` | 90 → 100 |
//! | `≥ max` | 100 |

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{clamp_score, lerp};
use crate::audio::loudness::lufs_serde;
use crate::audio::{calculate_lufs, AudioBuffer};
use crate::config::Thresholds;

const FLOOR_SCORE: f64 = 40.0;
const IDEAL_SCORE: f64 = 90.0;
/// Points lost per dB below `min`.
const BELOW_MIN_SLOPE: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeResult {
    /// Raw loudness plus device offset, the value that is scored.
    #[serde(with = "lufs_serde")]
    pub average_db: f64,
    #[serde(with = "lufs_serde")]
    pub raw_lufs: f64,
    pub device_db_offset: f64,
    pub score: f64,
}

impl VolumeResult {
    pub fn silent() -> Self {
        Self {
            average_db: f64::NEG_INFINITY,
            raw_lufs: f64::NEG_INFINITY,
            device_db_offset: 0.0,
            score: 0.0,
        }
    }
}

pub fn score_volume(db: f64, t: &Thresholds) -> f64 {
    if !db.is_finite() {
        return if db > 0.0 { 100.0 } else { 0.0 };
    }
    let raw = if db < t.min {
        (FLOOR_SCORE - (t.min - db) * BELOW_MIN_SLOPE).max(0.0)
    } else if db < t.ideal {
        lerp(db, t.min, t.ideal, FLOOR_SCORE, IDEAL_SCORE)
    } else if db < t.max {
        lerp(db, t.ideal, t.max, IDEAL_SCORE, 100.0)
    } else {
        100.0
    };
    clamp_score(raw)
}

/// Score the raw buffer's loudness after applying `device_db_offset`.
pub fn analyze_volume(raw: &AudioBuffer, device_db_offset: f64, t: &Thresholds) -> VolumeResult {
    let raw_lufs = calculate_lufs(raw);
    let average_db = raw_lufs + device_db_offset;
    let score = score_volume(average_db, t);
    debug!(raw_lufs, device_db_offset, average_db, score, "volume analyzed");
    VolumeResult {
        average_db,
        raw_lufs,
        device_db_offset,
        score,
    }
}
