//! Metric configuration: weights, thresholds and the speech-rate method.
//!
//! The authoritative copy lives with an external admin service; the engine
//! reads the local mirror stored under [`METRIC_CONFIG_KEY`]. Missing or
//! corrupt entries fall back to [`MetricConfigSet::defaults`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, VigorError};
use crate::storage::{load_json, save_json, KeyValueStore, METRIC_CONFIG_KEY};

/// Total weight shared across enabled metrics.
pub const WEIGHT_TOTAL: u32 = 100;

/// The five scored dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricId {
    Volume,
    SpeechRate,
    Acceleration,
    ResponseTime,
    Pauses,
}

impl MetricId {
    pub const ALL: [MetricId; 5] = [
        MetricId::Volume,
        MetricId::SpeechRate,
        MetricId::Acceleration,
        MetricId::ResponseTime,
        MetricId::Pauses,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricId::Volume => "volume",
            MetricId::SpeechRate => "speechRate",
            MetricId::Acceleration => "acceleration",
            MetricId::ResponseTime => "responseTime",
            MetricId::Pauses => "pauses",
        }
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricId {
    type Err = VigorError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "volume" => Ok(MetricId::Volume),
            "speechrate" | "tempo" => Ok(MetricId::SpeechRate),
            "acceleration" | "dynamics" => Ok(MetricId::Acceleration),
            "responsetime" | "latency" => Ok(MetricId::ResponseTime),
            "pauses" | "pause" => Ok(MetricId::Pauses),
            _ => Err(VigorError::UnknownMetric(raw.to_string())),
        }
    }
}

/// How words per minute are estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpeechRateMethod {
    /// Word count from the Deepgram transcription service.
    DeepgramStt,
    /// Word count supplied by the host's browser speech recognizer.
    WebSpeechApi,
    /// Syllable onsets from the spectral-flux detector.
    SpectralFlux,
    /// Energy-envelope peaks, VAD-gated when segments are available.
    #[default]
    EnergyPeaks,
}

impl SpeechRateMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            SpeechRateMethod::DeepgramStt => "deepgram-stt",
            SpeechRateMethod::WebSpeechApi => "web-speech-api",
            SpeechRateMethod::SpectralFlux => "spectral-flux",
            SpeechRateMethod::EnergyPeaks => "energy-peaks",
        }
    }

    /// Whether the method consumes an external word count.
    pub fn uses_transcript(self) -> bool {
        matches!(
            self,
            SpeechRateMethod::DeepgramStt | SpeechRateMethod::WebSpeechApi
        )
    }
}

impl fmt::Display for SpeechRateMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpeechRateMethod {
    type Err = VigorError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "deepgram-stt" | "deepgram" => Ok(SpeechRateMethod::DeepgramStt),
            "web-speech-api" | "web-speech" => Ok(SpeechRateMethod::WebSpeechApi),
            "spectral-flux" | "flux" => Ok(SpeechRateMethod::SpectralFlux),
            "energy-peaks" | "energy" | "vad-enhanced" => Ok(SpeechRateMethod::EnergyPeaks),
            other => Err(VigorError::Other(anyhow::anyhow!(
                "unknown speech rate method: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub min: f64,
    pub ideal: f64,
    pub max: f64,
}

impl Thresholds {
    pub const fn new(min: f64, ideal: f64, max: f64) -> Self {
        Self { min, ideal, max }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricConfig {
    pub id: MetricId,
    /// Share of the overall score, 0–100.
    pub weight: u32,
    pub thresholds: Thresholds,
    pub enabled: bool,
    /// Only meaningful for [`MetricId::SpeechRate`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<SpeechRateMethod>,
}

impl MetricConfig {
    pub fn default_for(id: MetricId) -> Self {
        let (weight, thresholds) = match id {
            MetricId::Volume => (40, Thresholds::new(-35.0, -20.0, -10.0)),
            MetricId::SpeechRate => (20, Thresholds::new(80.0, 150.0, 220.0)),
            MetricId::Acceleration => (15, Thresholds::new(0.0, 50.0, 100.0)),
            MetricId::ResponseTime => (15, Thresholds::new(0.0, 200.0, 1000.0)),
            MetricId::Pauses => (10, Thresholds::new(0.0, 0.1, 2.71)),
        };
        Self {
            id,
            weight,
            thresholds,
            enabled: true,
            method: (id == MetricId::SpeechRate).then_some(SpeechRateMethod::default()),
        }
    }
}

/// The full set of five metric configs, always in [`MetricId::ALL`] order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetricConfigSet {
    metrics: Vec<MetricConfig>,
}

impl Default for MetricConfigSet {
    fn default() -> Self {
        Self::defaults()
    }
}

impl MetricConfigSet {
    pub fn defaults() -> Self {
        Self {
            metrics: MetricId::ALL.iter().map(|&id| MetricConfig::default_for(id)).collect(),
        }
    }

    /// Build from an arbitrary list: duplicates keep the first entry, missing
    /// metrics come from defaults, and drifted weights are rebalanced.
    pub fn from_configs(configs: Vec<MetricConfig>) -> Self {
        let metrics = MetricId::ALL
            .iter()
            .map(|&id| {
                configs
                    .iter()
                    .find(|c| c.id == id)
                    .cloned()
                    .unwrap_or_else(|| MetricConfig::default_for(id))
            })
            .collect();
        let mut set = Self { metrics };
        if set.enabled_weight_sum() != WEIGHT_TOTAL && set.metrics.iter().any(|m| m.enabled) {
            debug!(sum = set.enabled_weight_sum(), "metric weights drifted, rebalancing");
            set.rebalance_weights();
        }
        set
    }

    /// Load the local mirror from `kv`, falling back to defaults.
    pub fn load(kv: &dyn KeyValueStore) -> Self {
        match load_json::<Vec<MetricConfig>>(kv, METRIC_CONFIG_KEY) {
            Ok(Some(list)) => Self::from_configs(list),
            Ok(None) => Self::defaults(),
            Err(e) => {
                warn!(error = %e, "metric config unreadable, using defaults");
                Self::defaults()
            }
        }
    }

    pub fn save(&self, kv: &dyn KeyValueStore) -> Result<()> {
        save_json(kv, METRIC_CONFIG_KEY, &self.metrics)
    }

    pub fn metrics(&self) -> &[MetricConfig] {
        &self.metrics
    }

    // Constructors keep `metrics` indexed by `MetricId` discriminant.
    pub fn get(&self, id: MetricId) -> &MetricConfig {
        &self.metrics[id as usize]
    }

    fn get_mut(&mut self, id: MetricId) -> &mut MetricConfig {
        &mut self.metrics[id as usize]
    }

    pub fn thresholds(&self, id: MetricId) -> Thresholds {
        self.get(id).thresholds
    }

    pub fn speech_rate_method(&self) -> SpeechRateMethod {
        self.get(MetricId::SpeechRate).method.unwrap_or_default()
    }

    pub fn set_speech_rate_method(&mut self, method: SpeechRateMethod) {
        self.get_mut(MetricId::SpeechRate).method = Some(method);
    }

    pub fn set_thresholds(&mut self, id: MetricId, thresholds: Thresholds) {
        self.get_mut(id).thresholds = thresholds;
    }

    /// Set one weight and rebalance the enabled set around it.
    pub fn set_weight(&mut self, id: MetricId, weight: u32) {
        self.get_mut(id).weight = weight.min(WEIGHT_TOTAL);
        self.rebalance_weights();
    }

    pub fn set_enabled(&mut self, id: MetricId, enabled: bool) {
        self.get_mut(id).enabled = enabled;
        self.rebalance_weights();
    }

    pub fn enabled_weight_sum(&self) -> u32 {
        self.metrics
            .iter()
            .filter(|m| m.enabled)
            .map(|m| m.weight)
            .sum()
    }

    /// Scale enabled weights so they sum to exactly 100.
    ///
    /// Rounding leftovers go to the first enabled metric. An all-zero enabled
    /// set is split evenly. Disabled metrics get weight 0, and with nothing
    /// enabled every weight is 0.
    pub fn rebalance_weights(&mut self) {
        let enabled: Vec<usize> = self
            .metrics
            .iter()
            .enumerate()
            .filter(|(_, m)| m.enabled)
            .map(|(i, _)| i)
            .collect();

        for m in self.metrics.iter_mut().filter(|m| !m.enabled) {
            m.weight = 0;
        }
        if enabled.is_empty() {
            return;
        }

        let sum = self.enabled_weight_sum();
        let mut assigned = 0i64;
        for &i in &enabled {
            let w = if sum == 0 {
                WEIGHT_TOTAL / enabled.len() as u32
            } else {
                (self.metrics[i].weight as f64 / sum as f64 * WEIGHT_TOTAL as f64).round() as u32
            };
            self.metrics[i].weight = w;
            assigned += w as i64;
        }

        // Leftover points land on the first enabled metric; a negative
        // leftover larger than its weight spills onto the next one.
        let mut remainder = WEIGHT_TOTAL as i64 - assigned;
        for &i in &enabled {
            if remainder == 0 {
                break;
            }
            let w = self.metrics[i].weight as i64;
            let adjusted = (w + remainder).max(0);
            remainder -= adjusted - w;
            self.metrics[i].weight = adjusted as u32;
        }
    }

    /// Each enabled metric's share of the enabled total, 0 when disabled or
    /// when nothing carries weight.
    pub fn normalized_weight(&self, id: MetricId) -> f64 {
        let sum = self.enabled_weight_sum();
        let metric = self.get(id);
        if !metric.enabled || sum == 0 {
            return 0.0;
        }
        metric.weight as f64 / sum as f64
    }
}
