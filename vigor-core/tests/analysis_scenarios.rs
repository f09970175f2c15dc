use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use vigor_core::analysis::RateMethodUsed;
use vigor_core::config::{MetricConfig, MetricConfigSet, MetricId, SpeechRateMethod};
use vigor_core::storage::{KeyValueStore, MemoryStore, CALIBRATION_PROFILES_KEY};
use vigor_core::transcription::{TranscribedWord, Transcriber, Transcription};
use vigor_core::{
    AnalysisRequest, AnalyzerConfig, CalibrationStore, EmotionalFeedback, EnergyAnalyzer,
    Result, VadMetrics, VadSegment, VigorError,
};

const RATE: u32 = 16_000;

/// 300 ms of near-silence, then `secs` of a 4 Hz syllable-rate envelope on a
/// 180 Hz carrier.
fn utterance(secs: f32, amplitude: f32) -> Vec<f32> {
    let lead = (0.3 * RATE as f32) as usize;
    let body = (secs * RATE as f32) as usize;
    let mut samples = vec![0.0005f32; lead];
    samples.extend((0..body).map(|i| {
        let t = i as f32 / RATE as f32;
        let env = (std::f32::consts::PI * 4.0 * t).sin().abs();
        amplitude * env * (2.0 * std::f32::consts::PI * 180.0 * t).sin()
    }));
    samples
}

fn speech_vad(total_ms: f64) -> VadMetrics {
    VadMetrics::from_segments(vec![VadSegment::new(300.0, total_ms - 100.0)], total_ms)
}

struct FixedTranscriber {
    words: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl Transcriber for FixedTranscriber {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn transcribe(&self, _audio: &[u8]) -> Result<Transcription> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let words: Vec<TranscribedWord> = (0..self.words)
            .map(|i| TranscribedWord {
                word: "word".into(),
                start: i as f64 * 0.3,
                end: i as f64 * 0.3 + 0.25,
                confidence: 0.9,
            })
            .collect();
        Ok(Transcription {
            transcript: vec!["word"; self.words].join(" "),
            words,
            ..Transcription::default()
        })
    }
}

/// Returns text but no timed words.
struct TextOnlyTranscriber;

#[async_trait]
impl Transcriber for TextOnlyTranscriber {
    fn name(&self) -> &'static str {
        "text-only"
    }

    async fn transcribe(&self, _audio: &[u8]) -> Result<Transcription> {
        Ok(Transcription {
            transcript: "one two three four five six".into(),
            words: Vec::new(),
            ..Transcription::default()
        })
    }
}

struct FailingTranscriber;

#[async_trait]
impl Transcriber for FailingTranscriber {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn transcribe(&self, _audio: &[u8]) -> Result<Transcription> {
        Err(VigorError::Transcription("service unavailable".into()))
    }
}

struct SlowTranscriber;

#[async_trait]
impl Transcriber for SlowTranscriber {
    fn name(&self) -> &'static str {
        "slow"
    }

    async fn transcribe(&self, _audio: &[u8]) -> Result<Transcription> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Transcription {
            transcript: "too late".into(),
            ..Transcription::default()
        })
    }
}

fn analyzer_with(kv: Arc<dyn KeyValueStore>, method: SpeechRateMethod) -> EnergyAnalyzer {
    let analyzer = EnergyAnalyzer::new(AnalyzerConfig::default(), kv);
    analyzer
        .update_metric_config(|m| m.set_speech_rate_method(method))
        .expect("save config");
    analyzer
}

#[tokio::test]
async fn silent_buffer_with_silent_vad_scores_zero() {
    let analyzer = EnergyAnalyzer::new(AnalyzerConfig::default(), Arc::new(MemoryStore::new()));
    let vad = VadMetrics::from_segments(vec![], 1000.0);
    assert_eq!(vad.speech_ratio, 0.0);
    assert_eq!(vad.total_speech_time, 0.0);

    let request = AnalysisRequest::new(vec![0.0; 44_100], 44_100).with_vad(vad);
    let result = analyzer.analyze(request).await;

    assert_eq!(result.overall_score, 0.0);
    assert_eq!(result.emotional_feedback, EmotionalFeedback::Poor);
    assert_eq!(result.volume.average_db, f64::NEG_INFINITY);

    let json = serde_json::to_value(&result).expect("serialize");
    assert!(json["volume"]["averageDb"].is_null());
    assert_eq!(json["emotionalFeedback"], "poor");
}

#[test]
fn calibration_profile_gain_for_three_db_cut() {
    let store = CalibrationStore::load(Arc::new(MemoryStore::new()));
    let profile = store
        .create_profile("usb-mic", "USB Mic", -50.0, -20.0, -23.0)
        .expect("create");
    assert!((profile.gain_adjustment - 0.708).abs() < 1e-3);
    assert!((profile.gain_adjustment - 10f64.powf(-3.0 / 20.0)).abs() < 1e-12);
}

#[test]
fn two_enabled_metrics_rebalance_to_half_each() {
    let configs = MetricId::ALL
        .iter()
        .map(|&id| {
            let mut c = MetricConfig::default_for(id);
            match id {
                MetricId::Volume | MetricId::SpeechRate => c.weight = 30,
                _ => c.enabled = false,
            }
            c
        })
        .collect();
    let set = MetricConfigSet::from_configs(configs);
    assert_eq!(set.get(MetricId::Volume).weight, 50);
    assert_eq!(set.get(MetricId::SpeechRate).weight, 50);
    assert_eq!(set.enabled_weight_sum(), 100);
}

#[tokio::test]
async fn web_speech_with_zero_words_uses_spectral_flux() {
    let analyzer = analyzer_with(Arc::new(MemoryStore::new()), SpeechRateMethod::WebSpeechApi);
    let samples = utterance(3.0, 0.3);
    let total_ms = samples.len() as f64 / RATE as f64 * 1000.0;
    let request = AnalysisRequest::new(samples, RATE)
        .with_vad(speech_vad(total_ms))
        .with_word_count(0);

    let result = analyzer.analyze(request).await;
    assert_eq!(result.speech_rate.method, RateMethodUsed::SpectralFlux);
    assert!(result.speech_rate.words_per_minute > 0.0);
    assert!(result.speech_rate.syllable_count.unwrap_or(0) >= 1);
}

#[tokio::test]
async fn transcript_word_count_sets_wpm_exactly() {
    let analyzer = analyzer_with(Arc::new(MemoryStore::new()), SpeechRateMethod::WebSpeechApi);
    let samples = utterance(2.7, 0.3);
    let secs = samples.len() as f64 / RATE as f64;
    let result = analyzer
        .analyze(AnalysisRequest::new(samples, RATE).with_word_count(8))
        .await;
    assert_eq!(result.speech_rate.words_per_minute, (8.0 / secs * 60.0).round());
    assert_eq!(result.speech_rate.method, RateMethodUsed::WebSpeechApi);
    // Halves never see the transcript.
    assert!(result.acceleration.first_half.words_per_minute >= 0.0);
}

#[tokio::test]
async fn deepgram_count_comes_from_transcriber() {
    let transcriber = Arc::new(FixedTranscriber {
        words: 9,
        calls: AtomicUsize::new(0),
    });
    let analyzer = analyzer_with(Arc::new(MemoryStore::new()), SpeechRateMethod::DeepgramStt)
        .with_transcriber(transcriber.clone());
    let samples = utterance(2.7, 0.3);
    let secs = samples.len() as f64 / RATE as f64;

    let result = analyzer
        .analyze(AnalysisRequest::new(samples, RATE).with_audio_blob(vec![1, 2, 3]))
        .await;
    assert_eq!(transcriber.calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.speech_rate.method, RateMethodUsed::DeepgramStt);
    assert_eq!(result.speech_rate.words_per_minute, (9.0 / secs * 60.0).round());
}

#[tokio::test]
async fn supplied_word_count_skips_transcriber() {
    let transcriber = Arc::new(FixedTranscriber {
        words: 9,
        calls: AtomicUsize::new(0),
    });
    let analyzer = analyzer_with(Arc::new(MemoryStore::new()), SpeechRateMethod::DeepgramStt)
        .with_transcriber(transcriber.clone());
    let request = AnalysisRequest::new(utterance(2.0, 0.3), RATE)
        .with_word_count(4)
        .with_audio_blob(vec![0; 8]);
    let result = analyzer.analyze(request).await;
    assert_eq!(transcriber.calls.load(Ordering::SeqCst), 0);
    assert_eq!(result.speech_rate.word_count, Some(4));
}

#[tokio::test]
async fn failing_transcriber_falls_back_to_flux() {
    let analyzer = analyzer_with(Arc::new(MemoryStore::new()), SpeechRateMethod::DeepgramStt)
        .with_transcriber(Arc::new(FailingTranscriber));
    let result = analyzer
        .analyze(AnalysisRequest::new(utterance(2.0, 0.3), RATE).with_audio_blob(vec![0; 8]))
        .await;
    assert_eq!(result.speech_rate.method, RateMethodUsed::SpectralFlux);
}

#[tokio::test]
async fn empty_word_list_falls_back_to_flux() {
    let analyzer = analyzer_with(Arc::new(MemoryStore::new()), SpeechRateMethod::DeepgramStt)
        .with_transcriber(Arc::new(TextOnlyTranscriber));
    let result = analyzer
        .analyze(AnalysisRequest::new(utterance(1.7, 0.3), RATE).with_audio_blob(vec![0; 8]))
        .await;
    assert_eq!(result.speech_rate.method, RateMethodUsed::SpectralFlux);
    assert_eq!(result.speech_rate.word_count, None);
    assert!(result.speech_rate.syllable_count.is_some());
}

#[tokio::test]
async fn slow_transcriber_times_out_and_falls_back() {
    let config = AnalyzerConfig {
        stt_timeout: Duration::from_millis(50),
        ..AnalyzerConfig::default()
    };
    let analyzer = EnergyAnalyzer::new(config, Arc::new(MemoryStore::new()))
        .with_transcriber(Arc::new(SlowTranscriber));
    analyzer
        .update_metric_config(|m| m.set_speech_rate_method(SpeechRateMethod::DeepgramStt))
        .expect("save config");

    let started = std::time::Instant::now();
    let result = analyzer
        .analyze(AnalysisRequest::new(utterance(1.5, 0.3), RATE).with_audio_blob(vec![0; 8]))
        .await;
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(result.speech_rate.method, RateMethodUsed::SpectralFlux);
}

#[tokio::test]
async fn every_score_stays_in_range() {
    let analyzer = EnergyAnalyzer::new(AnalyzerConfig::default(), Arc::new(MemoryStore::new()));
    let cases: Vec<Vec<f32>> = vec![
        vec![],
        vec![0.0; 4_000],
        vec![1.0; 16_000],
        utterance(0.05, 0.9),
        utterance(4.0, 0.01),
        utterance(4.0, 0.95),
        (0..16_000).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect(),
    ];
    for samples in cases {
        let result = analyzer.analyze(AnalysisRequest::new(samples, RATE)).await;
        for score in result.metric_scores() {
            assert!((0.0..=100.0).contains(&score), "metric score {score}");
        }
        assert!((0.0..=100.0).contains(&result.overall_score));
    }
}

#[tokio::test]
async fn history_is_capped_and_persisted() {
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let analyzer = EnergyAnalyzer::new(AnalyzerConfig::default(), Arc::clone(&kv));
    analyzer
        .calibration()
        .create_profile("mic", "Desk mic", -60.0, -26.0, -23.0)
        .expect("profile");

    for _ in 0..12 {
        let request = AnalysisRequest::new(utterance(1.0, 0.2), RATE).with_device("mic");
        analyzer.analyze(request).await;
    }

    let profile = analyzer.calibration().get_profile("mic").expect("profile");
    assert_eq!(profile.recording_history.len(), 10);
    assert!(kv.get(CALIBRATION_PROFILES_KEY).expect("read").is_some());

    // A fresh store sees the same history.
    let reloaded = CalibrationStore::load(kv);
    assert_eq!(
        reloaded.get_profile("mic").expect("profile").recording_history.len(),
        10
    );
}

#[tokio::test]
async fn device_offset_shifts_volume_but_not_raw_loudness() {
    let analyzer = EnergyAnalyzer::new(AnalyzerConfig::default(), Arc::new(MemoryStore::new()));
    analyzer
        .calibration()
        .create_profile("quiet-mic", "Laptop", -65.0, -33.0, -23.0)
        .expect("profile");
    let samples = utterance(2.0, 0.1);

    let plain = analyzer
        .analyze(AnalysisRequest::new(samples.clone(), RATE))
        .await;
    let calibrated = analyzer
        .analyze(AnalysisRequest::new(samples, RATE).with_device("quiet-mic"))
        .await;

    assert_eq!(plain.volume.raw_lufs, calibrated.volume.raw_lufs);
    assert!((calibrated.volume.device_db_offset - 10.0).abs() < 1e-9);
    assert!(calibrated.volume.score > plain.volume.score);
}
