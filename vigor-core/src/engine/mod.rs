//! `EnergyAnalyzer`: one recording in, one [`AnalysisResult`] out.
//!
//! ## Pipeline
//!
//! ```text
//! analyze(request)
//!     ├─► no-speech guard (VAD ratio / speech time) ─► AnalysisResult::no_speech()
//!     ├─► Normalizer: calibrated + normalized buffer, history append
//!     ├─► volume: raw LUFS + device offset
//!     ├─► word count: request value, else Transcriber (bounded by stt_timeout)
//!     ├─► speech rate / acceleration / response time / pauses on the normalized buffer
//!     └─► ScoreAggregator
//! ```
//!
//! The transcription call is the only await point. Metric config is cloned
//! out of its lock before it, so no guard is held across `.await`.
//!
//! `EnergyAnalyzer` is `Send + Sync`; wrap it in `Arc` to share it between
//! tasks.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::analysis::dynamics::analyze_acceleration;
use crate::analysis::latency::analyze_response_time;
use crate::analysis::pauses::analyze_pauses;
use crate::analysis::speech_rate::{analyze_speech_rate, SpeechRateParams, DEFAULT_SYLLABLES_PER_WORD};
use crate::analysis::volume::analyze_volume;
use crate::analysis::AnalysisResult;
use crate::audio::AudioBuffer;
use crate::calibration::{CalibrationStore, Normalizer, DEFAULT_TARGET_LUFS};
use crate::config::{MetricConfigSet, MetricId, SpeechRateMethod};
use crate::error::{Result, VigorError};
use crate::scoring::{MetricResults, ScoreAggregator};
use crate::storage::KeyValueStore;
use crate::transcription::{Transcriber, Transcription};
use crate::vad::VadMetrics;

/// Configuration for `EnergyAnalyzer`.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Loudness every recording is normalized to. Default: -23 LUFS.
    pub target_lufs: f64,
    /// Upper bound on one transcription call. Default: 15 s.
    pub stt_timeout: Duration,
    /// Onsets per word for the syllable-counting methods. Default: 1.5.
    pub syllables_per_word: f64,
    /// VAD speech ratio at or below which the recording counts as silent.
    pub no_speech_ratio: f64,
    /// VAD speech time (ms) at or below which the recording counts as silent.
    pub no_speech_min_ms: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            target_lufs: DEFAULT_TARGET_LUFS,
            stt_timeout: Duration::from_secs(15),
            syllables_per_word: DEFAULT_SYLLABLES_PER_WORD,
            no_speech_ratio: 0.02,
            no_speech_min_ms: 200.0,
        }
    }
}

/// Everything known about one recording.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub buffer: AudioBuffer,
    pub device_id: Option<String>,
    pub vad_metrics: Option<VadMetrics>,
    /// Word count from a recognizer the host already ran.
    pub stt_word_count: Option<u32>,
    /// Encoded recording, sent to the transcriber for `deepgram-stt`.
    pub audio_blob: Option<Vec<u8>>,
}

impl AnalysisRequest {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::from_buffer(AudioBuffer::new(samples, sample_rate))
    }

    pub fn from_buffer(buffer: AudioBuffer) -> Self {
        Self {
            buffer,
            device_id: None,
            vad_metrics: None,
            stt_word_count: None,
            audio_blob: None,
        }
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn with_vad(mut self, vad: VadMetrics) -> Self {
        self.vad_metrics = Some(vad);
        self
    }

    pub fn with_word_count(mut self, words: u32) -> Self {
        self.stt_word_count = Some(words);
        self
    }

    pub fn with_audio_blob(mut self, blob: Vec<u8>) -> Self {
        self.audio_blob = Some(blob);
        self
    }
}

/// The top-level scoring handle.
pub struct EnergyAnalyzer {
    config: AnalyzerConfig,
    kv: Arc<dyn KeyValueStore>,
    calibration: Arc<CalibrationStore>,
    normalizer: Normalizer,
    metrics: RwLock<MetricConfigSet>,
    transcriber: Option<Arc<dyn Transcriber>>,
}

impl EnergyAnalyzer {
    /// Load calibration profiles and metric config from `kv`.
    pub fn new(config: AnalyzerConfig, kv: Arc<dyn KeyValueStore>) -> Self {
        let calibration = Arc::new(CalibrationStore::load(Arc::clone(&kv)));
        let normalizer = Normalizer::new(Arc::clone(&calibration), config.target_lufs);
        let metrics = MetricConfigSet::load(kv.as_ref());
        info!(
            target_lufs = config.target_lufs,
            profiles = calibration.list_profiles().len(),
            method = %metrics.speech_rate_method(),
            "energy analyzer ready"
        );
        Self {
            config,
            kv,
            calibration,
            normalizer,
            metrics: RwLock::new(metrics),
            transcriber: None,
        }
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn calibration(&self) -> &Arc<CalibrationStore> {
        &self.calibration
    }

    /// Snapshot of the active metric configuration.
    pub fn metric_config(&self) -> MetricConfigSet {
        self.metrics.read().clone()
    }

    /// Re-read the metric config from the store.
    pub fn reload_metric_config(&self) {
        *self.metrics.write() = MetricConfigSet::load(self.kv.as_ref());
        debug!("metric config reloaded");
    }

    /// Apply `edit` to the metric config and persist the result.
    pub fn update_metric_config<F>(&self, edit: F) -> Result<()>
    where
        F: FnOnce(&mut MetricConfigSet),
    {
        let mut metrics = self.metrics.write();
        edit(&mut metrics);
        metrics.save(self.kv.as_ref())
    }

    /// Replace the in-memory config without persisting it (one-off runs).
    pub fn override_metric_config(&self, metrics: MetricConfigSet) {
        *self.metrics.write() = metrics;
    }

    /// VAD-confirmed silence: speech ratio or total speech time too small.
    pub fn is_no_speech(&self, vad: &VadMetrics) -> bool {
        vad.speech_ratio <= self.config.no_speech_ratio
            || vad.total_speech_time <= self.config.no_speech_min_ms
    }

    /// Score one recording. Never fails: every degraded input maps to a
    /// defined score.
    pub async fn analyze(&self, request: AnalysisRequest) -> AnalysisResult {
        if let Some(vad) = request.vad_metrics.as_ref() {
            if self.is_no_speech(vad) {
                info!(
                    speech_ratio = vad.speech_ratio,
                    speech_ms = vad.total_speech_time,
                    "no speech detected, skipping analysis"
                );
                return AnalysisResult::no_speech();
            }
        }

        let metrics = self.metric_config();
        let device_id = request.device_id.as_deref();
        let vad = request.vad_metrics.as_ref();

        let outcome = self.normalizer.calibrate_and_normalize(&request.buffer, device_id);
        let volume = analyze_volume(
            &request.buffer,
            self.normalizer.device_db_offset(device_id),
            &metrics.thresholds(MetricId::Volume),
        );

        let method = metrics.speech_rate_method();
        let word_count = self.resolve_word_count(&request, method).await;
        let rate_params = SpeechRateParams {
            method,
            thresholds: metrics.thresholds(MetricId::SpeechRate),
            syllables_per_word: self.config.syllables_per_word,
        };

        let normalized = &outcome.buffer;
        let results = MetricResults {
            volume,
            speech_rate: analyze_speech_rate(normalized, vad, Some(word_count), &rate_params),
            acceleration: analyze_acceleration(normalized, vad, &rate_params),
            response_time: analyze_response_time(normalized, &metrics.thresholds(MetricId::ResponseTime)),
            pauses: analyze_pauses(normalized, vad, &metrics.thresholds(MetricId::Pauses)),
        };

        ScoreAggregator::new(&metrics).aggregate(results, Some(outcome.diagnostics))
    }

    /// Word count for the top-level rate estimate. 0 means "none available"
    /// and makes transcript methods fall back to spectral flux.
    async fn resolve_word_count(&self, request: &AnalysisRequest, method: SpeechRateMethod) -> u32 {
        if let Some(words) = request.stt_word_count {
            return words;
        }
        if method != SpeechRateMethod::DeepgramStt {
            return 0;
        }
        let (Some(transcriber), Some(blob)) = (self.transcriber.as_ref(), request.audio_blob.as_deref())
        else {
            debug!("no transcriber or audio blob, using spectral flux");
            return 0;
        };

        match self.transcribe_bounded(transcriber.as_ref(), blob).await {
            Ok(t) => {
                let words = t.word_count();
                if words == 0 {
                    warn!(backend = transcriber.name(), "transcription returned no words");
                }
                words
            }
            Err(e) => {
                warn!(backend = transcriber.name(), error = %e, "transcription failed, using spectral flux");
                0
            }
        }
    }

    async fn transcribe_bounded(
        &self,
        transcriber: &dyn Transcriber,
        blob: &[u8],
    ) -> Result<Transcription> {
        match tokio::time::timeout(self.config.stt_timeout, transcriber.transcribe(blob)).await {
            Ok(result) => result,
            Err(_) => Err(VigorError::TranscriptionTimeout {
                secs: self.config.stt_timeout.as_secs_f64(),
            }),
        }
    }
}

impl std::fmt::Debug for EnergyAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnergyAnalyzer")
            .field("config", &self.config)
            .field("calibration", &self.calibration)
            .field("transcriber", &self.transcriber.as_ref().map(|t| t.name()))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::EmotionalFeedback;
    use crate::storage::MemoryStore;
    use crate::vad::VadSegment;

    fn analyzer() -> EnergyAnalyzer {
        EnergyAnalyzer::new(AnalyzerConfig::default(), Arc::new(MemoryStore::new()))
    }

    #[test]
    fn default_config_values() {
        let c = AnalyzerConfig::default();
        assert_eq!(c.target_lufs, -23.0);
        assert_eq!(c.stt_timeout, Duration::from_secs(15));
        assert_eq!(c.syllables_per_word, 1.5);
    }

    #[test]
    fn no_speech_guard_thresholds() {
        let a = analyzer();
        let short = VadMetrics::from_segments(vec![VadSegment::new(0.0, 200.0)], 2000.0);
        assert!(a.is_no_speech(&short));
        let quiet = VadMetrics::from_segments(vec![VadSegment::new(0.0, 300.0)], 20_000.0);
        assert!(a.is_no_speech(&quiet));
        let ok = VadMetrics::from_segments(vec![VadSegment::new(0.0, 800.0)], 2000.0);
        assert!(!a.is_no_speech(&ok));
    }

    #[tokio::test]
    async fn silent_vad_short_circuits() {
        let a = analyzer();
        a.calibration()
            .create_profile("mic", "Desk", -60.0, -20.0, -23.0)
            .expect("profile");
        let request = AnalysisRequest::new(vec![0.3; 16_000], 16_000)
            .with_device("mic")
            .with_vad(VadMetrics::from_segments(vec![], 1000.0));
        let r = a.analyze(request).await;
        assert_eq!(r, AnalysisResult::no_speech());
        // Short-circuit skips the history append.
        let profile = a.calibration().get_profile("mic").expect("profile");
        assert!(profile.recording_history.is_empty());
    }

    #[tokio::test]
    async fn full_run_attaches_diagnostics() {
        let a = analyzer();
        a.update_metric_config(|m| m.set_speech_rate_method(SpeechRateMethod::WebSpeechApi))
            .expect("save");
        let samples = (0..32_000)
            .map(|i| 0.2 * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / 16_000.0).sin())
            .collect();
        let r = a.analyze(AnalysisRequest::new(samples, 16_000).with_word_count(6)).await;
        let diagnostics = r.normalization.expect("diagnostics");
        assert!((diagnostics.final_lufs + 23.0).abs() < 0.1);
        assert_eq!(r.speech_rate.words_per_minute, 180.0);
        assert!((0.0..=100.0).contains(&r.overall_score));
        assert_ne!(r.emotional_feedback, EmotionalFeedback::Poor);
    }

    #[test]
    fn config_updates_are_persisted() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let a = EnergyAnalyzer::new(AnalyzerConfig::default(), Arc::clone(&kv));
        a.update_metric_config(|m| m.set_speech_rate_method(SpeechRateMethod::SpectralFlux))
            .expect("save");
        let b = EnergyAnalyzer::new(AnalyzerConfig::default(), kv);
        assert_eq!(b.metric_config().speech_rate_method(), SpeechRateMethod::SpectralFlux);
    }

    #[test]
    fn override_is_dropped_on_reload() {
        let a = analyzer();
        let mut one_off = a.metric_config();
        one_off.set_speech_rate_method(SpeechRateMethod::DeepgramStt);
        a.override_metric_config(one_off);
        assert_eq!(a.metric_config().speech_rate_method(), SpeechRateMethod::DeepgramStt);
        a.reload_metric_config();
        assert_eq!(a.metric_config().speech_rate_method(), SpeechRateMethod::EnergyPeaks);
    }
}
