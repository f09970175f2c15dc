//! Per-device calibration profiles.
//!
//! A profile maps one microphone's natural speaking loudness onto a common
//! reference level. It is created once by the two-phase wizard, then grows a
//! bounded history of [`RecordingStats`] as recordings are analyzed. That
//! history drives [`CalibrationStore::check_recalibration_needed`].
//!
//! ## Concurrency
//!
//! Profiles are indexed by device id. Each profile sits behind its own
//! `parking_lot::Mutex`, so history appends for one device are single-writer
//! while other devices proceed independently.

pub mod normalize;
pub mod wizard;

pub use normalize::{NormalizationOutcome, Normalizer};
pub use wizard::CalibrationWizard;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::audio::db_to_gain;
use crate::audio::loudness::lufs_serde;
use crate::error::{Result, VigorError};
use crate::storage::{load_json, save_json, KeyValueStore, CALIBRATION_PROFILES_KEY};

/// Reference loudness every profile normalizes toward.
pub const DEFAULT_TARGET_LUFS: f64 = -23.0;
pub const MIN_GAIN_ADJUSTMENT: f64 = 0.1;
pub const MAX_GAIN_ADJUSTMENT: f64 = 10.0;
/// Ring-buffer capacity of `recording_history`.
pub const MAX_HISTORY: usize = 10;

// Recalibration thresholds.
const MIN_HISTORY_FOR_CHECK: usize = 3;
const LUFS_STDEV_THRESHOLD: f64 = 5.0;
const NOISE_STDEV_THRESHOLD: f64 = 10.0;
const MAX_PROFILE_AGE_DAYS: i64 = 30;
const TARGET_DRIFT_THRESHOLD: f64 = 3.0;

/// Loudness snapshot appended after every analyzed recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingStats {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "originalLUFS", with = "lufs_serde")]
    pub original_lufs: f64,
    #[serde(rename = "calibratedLUFS", with = "lufs_serde")]
    pub calibrated_lufs: f64,
    #[serde(rename = "finalLUFS", with = "lufs_serde")]
    pub final_lufs: f64,
    #[serde(rename = "noiseFloor")]
    pub noise_floor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationProfile {
    pub device_id: String,
    pub label: String,
    /// Noise floor measured during the silence phase (dB).
    pub noise_floor: f64,
    /// Speaking loudness measured during the speech phase (LUFS).
    pub reference_level: f64,
    /// Linear gain in [0.1, 10].
    pub gain_adjustment: f64,
    #[serde(default = "default_target")]
    pub target_level: f64,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
    #[serde(default)]
    pub recording_history: VecDeque<RecordingStats>,
}

fn default_target() -> f64 {
    DEFAULT_TARGET_LUFS
}

impl CalibrationProfile {
    /// Build a profile; `gain_adjustment = clamp(10^((target - reference)/20), 0.1, 10)`.
    pub fn new(
        device_id: impl Into<String>,
        label: impl Into<String>,
        noise_floor: f64,
        reference_level: f64,
        target_level: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            device_id: device_id.into(),
            label: label.into(),
            noise_floor,
            reference_level,
            gain_adjustment: gain_for(reference_level, target_level),
            target_level,
            created_at: now,
            last_used: now,
            recording_history: VecDeque::new(),
        }
    }

    /// Append a stats entry, evicting the oldest beyond [`MAX_HISTORY`].
    pub fn push_history(&mut self, stats: RecordingStats) {
        while self.recording_history.len() >= MAX_HISTORY {
            self.recording_history.pop_front();
        }
        self.last_used = stats.timestamp;
        self.recording_history.push_back(stats);
    }

    /// Offset added to raw loudness for volume scoring only.
    pub fn device_db_offset(&self, target_lufs: f64) -> f64 {
        target_lufs - self.reference_level
    }
}

/// Gain that lifts `reference_level` onto `target_level`, clamped.
///
/// Non-finite inputs (e.g. a silent reference) fall back to unity gain.
pub fn gain_for(reference_level: f64, target_level: f64) -> f64 {
    let gain = db_to_gain(target_level - reference_level);
    if gain.is_nan() {
        return 1.0;
    }
    gain.clamp(MIN_GAIN_ADJUSTMENT, MAX_GAIN_ADJUSTMENT)
}

/// How urgently a profile should be recalibrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecalibrationSeverity {
    Good,
    Warning,
    Recommend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalibrationAdvice {
    pub should_recalibrate: bool,
    pub severity: RecalibrationSeverity,
    pub reasons: Vec<String>,
}

impl RecalibrationAdvice {
    fn good() -> Self {
        Self {
            should_recalibrate: false,
            severity: RecalibrationSeverity::Good,
            reasons: Vec::new(),
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation; 0 for fewer than two values.
fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Assess a profile's history against fixed staleness thresholds.
pub fn assess_profile(profile: &CalibrationProfile, now: DateTime<Utc>) -> RecalibrationAdvice {
    let history = &profile.recording_history;
    if history.len() < MIN_HISTORY_FOR_CHECK {
        return RecalibrationAdvice::good();
    }

    let finite = |f: fn(&RecordingStats) -> f64| -> Vec<f64> {
        history.iter().map(f).filter(|v| v.is_finite()).collect()
    };
    let original = finite(|s| s.original_lufs);
    let noise = finite(|s| s.noise_floor);
    let calibrated = finite(|s| s.calibrated_lufs);

    let mut severity = RecalibrationSeverity::Good;
    let mut reasons = Vec::new();
    let mut escalate = |ratio: f64, reason: String| {
        let level = if ratio > 2.0 {
            RecalibrationSeverity::Recommend
        } else {
            RecalibrationSeverity::Warning
        };
        severity = severity.max(level);
        reasons.push(reason);
    };

    let lufs_sd = std_dev(&original);
    if lufs_sd > LUFS_STDEV_THRESHOLD {
        escalate(
            lufs_sd / LUFS_STDEV_THRESHOLD,
            format!("input loudness varies by {lufs_sd:.1} LU between recordings"),
        );
    }

    let noise_sd = std_dev(&noise);
    if noise_sd > NOISE_STDEV_THRESHOLD {
        escalate(
            noise_sd / NOISE_STDEV_THRESHOLD,
            format!("background noise varies by {noise_sd:.1} dB between recordings"),
        );
    }

    if !calibrated.is_empty() {
        let drift = (mean(&calibrated) - profile.target_level).abs();
        if drift > TARGET_DRIFT_THRESHOLD {
            escalate(
                drift / TARGET_DRIFT_THRESHOLD,
                format!("calibrated loudness is {drift:.1} LU away from target"),
            );
        }
    }

    let age = now.signed_duration_since(profile.created_at);
    if age > Duration::days(MAX_PROFILE_AGE_DAYS) {
        severity = RecalibrationSeverity::Recommend;
        reasons.push(format!("profile is {} days old", age.num_days()));
    }

    RecalibrationAdvice {
        should_recalibrate: severity != RecalibrationSeverity::Good,
        severity,
        reasons,
    }
}

/// Device-keyed profile registry persisted through a [`KeyValueStore`].
pub struct CalibrationStore {
    kv: Arc<dyn KeyValueStore>,
    profiles: RwLock<HashMap<String, Arc<Mutex<CalibrationProfile>>>>,
    /// Held across every mutation and its persist, so snapshots reach the
    /// store in the order they were taken.
    write_lock: Mutex<()>,
}

impl CalibrationStore {
    /// Load profiles from `kv`. A corrupt or missing entry starts empty.
    pub fn load(kv: Arc<dyn KeyValueStore>) -> Self {
        let loaded: Vec<CalibrationProfile> =
            match load_json(kv.as_ref(), CALIBRATION_PROFILES_KEY) {
                Ok(Some(list)) => list,
                Ok(None) => Vec::new(),
                Err(e) => {
                    warn!(error = %e, "calibration profiles unreadable, starting empty");
                    Vec::new()
                }
            };
        let profiles = loaded
            .into_iter()
            .map(|p| (p.device_id.clone(), Arc::new(Mutex::new(p))))
            .collect();
        Self {
            kv,
            profiles: RwLock::new(profiles),
            write_lock: Mutex::new(()),
        }
    }

    /// Create (or replace) a device's profile and persist it.
    pub fn create_profile(
        &self,
        device_id: &str,
        label: &str,
        noise_floor: f64,
        reference_level: f64,
        target_level: f64,
    ) -> Result<CalibrationProfile> {
        let profile =
            CalibrationProfile::new(device_id, label, noise_floor, reference_level, target_level);
        info!(
            device_id,
            noise_floor,
            reference_level,
            gain = profile.gain_adjustment,
            "calibration profile created"
        );
        self.save_profile(profile.clone())?;
        Ok(profile)
    }

    pub fn save_profile(&self, profile: CalibrationProfile) -> Result<()> {
        let _writer = self.write_lock.lock();
        self.profiles
            .write()
            .insert(profile.device_id.clone(), Arc::new(Mutex::new(profile)));
        self.persist()
    }

    pub fn get_profile(&self, device_id: &str) -> Option<CalibrationProfile> {
        self.handle(device_id).map(|p| p.lock().clone())
    }

    pub fn list_profiles(&self) -> Vec<CalibrationProfile> {
        let mut list: Vec<CalibrationProfile> = self
            .profiles
            .read()
            .values()
            .map(|p| p.lock().clone())
            .collect();
        list.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        list
    }

    pub fn delete_profile(&self, device_id: &str) -> Result<()> {
        let _writer = self.write_lock.lock();
        if self.profiles.write().remove(device_id).is_none() {
            return Err(VigorError::ProfileNotFound(device_id.to_string()));
        }
        info!(device_id, "calibration profile deleted");
        self.persist()
    }

    /// Append a stats snapshot to the device's history and persist.
    ///
    /// Returns `false` when the device has no profile. Persistence failures
    /// are logged, the in-memory history is still updated.
    pub fn record_stats(&self, device_id: &str, stats: RecordingStats) -> bool {
        let Some(handle) = self.handle(device_id) else {
            return false;
        };
        let _writer = self.write_lock.lock();
        handle.lock().push_history(stats);
        if let Err(e) = self.persist() {
            warn!(device_id, error = %e, "failed to persist recording stats");
        }
        true
    }

    pub fn check_recalibration_needed(&self, device_id: &str) -> Result<RecalibrationAdvice> {
        let profile = self
            .get_profile(device_id)
            .ok_or_else(|| VigorError::ProfileNotFound(device_id.to_string()))?;
        Ok(assess_profile(&profile, Utc::now()))
    }

    fn handle(&self, device_id: &str) -> Option<Arc<Mutex<CalibrationProfile>>> {
        self.profiles.read().get(device_id).cloned()
    }

    /// Callers hold `write_lock`.
    fn persist(&self) -> Result<()> {
        let list = self.list_profiles();
        save_json(self.kv.as_ref(), CALIBRATION_PROFILES_KEY, &list)
    }
}

impl std::fmt::Debug for CalibrationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalibrationStore")
            .field("profiles", &self.profiles.read().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use approx::assert_relative_eq;

    fn stats(original: f64, calibrated: f64, noise: f64) -> RecordingStats {
        RecordingStats {
            timestamp: Utc::now(),
            original_lufs: original,
            calibrated_lufs: calibrated,
            final_lufs: -23.0,
            noise_floor: noise,
        }
    }

    fn store() -> CalibrationStore {
        CalibrationStore::load(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn gain_for_loud_reference_attenuates() {
        let p = CalibrationProfile::new("mic", "USB", -50.0, -20.0, -23.0);
        assert_relative_eq!(p.gain_adjustment, 10f64.powf(-3.0 / 20.0), epsilon = 1e-12);
        assert_relative_eq!(p.gain_adjustment, 0.708, epsilon = 1e-3);
    }

    #[test]
    fn gain_is_clamped_for_extreme_levels() {
        assert_eq!(gain_for(-200.0, -23.0), MAX_GAIN_ADJUSTMENT);
        assert_eq!(gain_for(60.0, -23.0), MIN_GAIN_ADJUSTMENT);
        assert_eq!(gain_for(f64::NEG_INFINITY, -23.0), MAX_GAIN_ADJUSTMENT);
        assert_eq!(gain_for(f64::NAN, -23.0), 1.0);
    }

    #[test]
    fn history_is_fifo_capped() {
        let mut p = CalibrationProfile::new("mic", "USB", -50.0, -20.0, -23.0);
        for i in 0..15 {
            p.push_history(stats(-20.0 - i as f64, -23.0, -50.0));
        }
        assert_eq!(p.recording_history.len(), MAX_HISTORY);
        // Entries 0..5 were evicted; the oldest survivor is entry 5.
        assert_relative_eq!(p.recording_history[0].original_lufs, -25.0);
        assert_relative_eq!(p.recording_history[9].original_lufs, -34.0);
    }

    #[test]
    fn short_history_never_recommends() {
        let mut p = CalibrationProfile::new("mic", "USB", -50.0, -20.0, -23.0);
        p.created_at = Utc::now() - Duration::days(400);
        p.push_history(stats(-5.0, -60.0, 0.0));
        p.push_history(stats(-60.0, -60.0, -90.0));
        let advice = assess_profile(&p, Utc::now());
        assert!(!advice.should_recalibrate);
        assert_eq!(advice.severity, RecalibrationSeverity::Good);
    }

    #[test]
    fn stable_history_is_good() {
        let mut p = CalibrationProfile::new("mic", "USB", -50.0, -20.0, -23.0);
        for _ in 0..5 {
            p.push_history(stats(-20.0, -23.0, -50.0));
        }
        let advice = assess_profile(&p, Utc::now());
        assert_eq!(advice.severity, RecalibrationSeverity::Good);
        assert!(advice.reasons.is_empty());
    }

    #[test]
    fn moderate_drift_warns() {
        let mut p = CalibrationProfile::new("mic", "USB", -50.0, -20.0, -23.0);
        for _ in 0..3 {
            // |mean - target| = 4 → ratio 1.33
            p.push_history(stats(-20.0, -27.0, -50.0));
        }
        let advice = assess_profile(&p, Utc::now());
        assert!(advice.should_recalibrate);
        assert_eq!(advice.severity, RecalibrationSeverity::Warning);
    }

    #[test]
    fn large_variance_recommends() {
        let mut p = CalibrationProfile::new("mic", "USB", -50.0, -20.0, -23.0);
        // Original LUFS alternating -5 / -35 → stdev ≈ 15 > 2×5.
        for v in [-5.0, -35.0, -5.0, -35.0] {
            p.push_history(stats(v, -23.0, -50.0));
        }
        let advice = assess_profile(&p, Utc::now());
        assert_eq!(advice.severity, RecalibrationSeverity::Recommend);
    }

    #[test]
    fn old_profile_recommends() {
        let mut p = CalibrationProfile::new("mic", "USB", -50.0, -20.0, -23.0);
        for _ in 0..3 {
            p.push_history(stats(-20.0, -23.0, -50.0));
        }
        p.created_at = Utc::now() - Duration::days(31);
        let advice = assess_profile(&p, Utc::now());
        assert_eq!(advice.severity, RecalibrationSeverity::Recommend);
    }

    #[test]
    fn silent_entries_are_ignored_by_statistics() {
        let mut p = CalibrationProfile::new("mic", "USB", -50.0, -20.0, -23.0);
        p.push_history(stats(f64::NEG_INFINITY, f64::NEG_INFINITY, -200.0));
        for _ in 0..3 {
            p.push_history(stats(-20.0, -23.0, -200.0));
        }
        assert_eq!(assess_profile(&p, Utc::now()).severity, RecalibrationSeverity::Good);
    }

    #[test]
    fn store_persists_and_reloads() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let first = CalibrationStore::load(Arc::clone(&kv));
        first
            .create_profile("mic-1", "Desk mic", -55.0, -18.0, -23.0)
            .expect("create");
        assert!(first.record_stats("mic-1", stats(f64::NEG_INFINITY, -23.0, -55.0)));

        let reloaded = CalibrationStore::load(kv);
        let profile = reloaded.get_profile("mic-1").expect("profile persisted");
        assert_eq!(profile.label, "Desk mic");
        assert_eq!(profile.recording_history.len(), 1);
        assert_eq!(profile.recording_history[0].original_lufs, f64::NEG_INFINITY);
    }

    #[test]
    fn record_stats_for_unknown_device_is_ignored() {
        let store = store();
        assert!(!store.record_stats("nobody", stats(-20.0, -23.0, -50.0)));
    }

    #[test]
    fn delete_unknown_profile_errors() {
        let store = store();
        assert!(matches!(
            store.delete_profile("ghost"),
            Err(VigorError::ProfileNotFound(_))
        ));
    }

    #[test]
    fn persisted_json_uses_wire_field_names() {
        let kv = Arc::new(MemoryStore::new());
        let store = CalibrationStore::load(kv.clone());
        store
            .create_profile("mic", "USB", -50.0, -20.0, -23.0)
            .expect("create");
        store.record_stats("mic", stats(-21.0, -23.5, -48.0));
        let raw = kv.get(CALIBRATION_PROFILES_KEY).expect("get").expect("present");
        let json: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(json[0]["deviceId"], "mic");
        assert!(json[0]["gainAdjustment"].is_number());
        assert_eq!(json[0]["recordingHistory"][0]["originalLUFS"], -21.0);
        assert_eq!(json[0]["recordingHistory"][0]["noiseFloor"], -48.0);
    }

    /// Delays the first history write so a second writer can overtake it.
    struct StallingStore {
        inner: MemoryStore,
        writes: std::sync::atomic::AtomicUsize,
    }

    impl KeyValueStore for StallingStore {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            // Write 0 is the profile creation, write 1 the first append.
            if self.writes.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 1 {
                std::thread::sleep(std::time::Duration::from_millis(150));
            }
            self.inner.set(key, value)
        }

        fn delete(&self, key: &str) -> Result<()> {
            self.inner.delete(key)
        }
    }

    #[test]
    fn concurrent_appends_persist_latest_history() {
        let kv = Arc::new(StallingStore {
            inner: MemoryStore::new(),
            writes: std::sync::atomic::AtomicUsize::new(0),
        });
        let store = CalibrationStore::load(kv.clone());
        store
            .create_profile("mic", "USB", -50.0, -20.0, -23.0)
            .expect("create");

        std::thread::scope(|s| {
            s.spawn(|| store.record_stats("mic", stats(-21.0, -23.0, -48.0)));
            std::thread::sleep(std::time::Duration::from_millis(50));
            s.spawn(|| store.record_stats("mic", stats(-22.0, -23.0, -49.0)));
        });

        assert_eq!(store.get_profile("mic").expect("profile").recording_history.len(), 2);
        let persisted: Vec<CalibrationProfile> = load_json(kv.as_ref(), CALIBRATION_PROFILES_KEY)
            .expect("load")
            .expect("present");
        assert_eq!(persisted[0].recording_history.len(), 2);
    }
}
