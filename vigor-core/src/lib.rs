//! # vigor-core
//!
//! Speech energy scoring engine.
//!
//! ## Architecture
//!
//! ```text
//! (samples, sample_rate, device_id?, vad?, word_count?, blob?)
//!         │
//!   no-speech guard ──────────────► all-zero AnalysisResult
//!         │
//!   Normalizer ── calibrated + LUFS-normalized buffer ──┬─► SpeechRateEstimator (may await Transcriber)
//!         │                                             ├─► DynamicsAnalyzer
//!         └── raw LUFS + device offset ─► volume        ├─► ResponseLatencyDetector
//!                                                       └─► PauseAnalyzer
//!                                                              │
//!                                                       ScoreAggregator
//! ```
//!
//! Analysis never fails: every numeric edge case degrades to a defined value.
//! Only store and transcription plumbing return [`VigorError`].

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod analysis;
pub mod audio;
pub mod calibration;
pub mod config;
pub mod engine;
pub mod error;
pub mod scoring;
pub mod storage;
pub mod transcription;
pub mod vad;

// Convenience re-exports for downstream crates
pub use analysis::{AnalysisResult, EmotionalFeedback, NormalizationDiagnostics};
pub use audio::AudioBuffer;
pub use calibration::{CalibrationProfile, CalibrationStore, RecalibrationAdvice, RecordingStats};
pub use config::{MetricConfig, MetricConfigSet, MetricId, SpeechRateMethod, Thresholds};
pub use engine::{AnalysisRequest, AnalyzerConfig, EnergyAnalyzer};
pub use error::{Result, VigorError};
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore};
pub use transcription::{Transcriber, Transcription};
pub use vad::{VadMetrics, VadSegment};

#[cfg(feature = "deepgram")]
pub use transcription::deepgram::{DeepgramConfig, DeepgramTranscriber};
