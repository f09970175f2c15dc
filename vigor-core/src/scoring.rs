//! Weighted combination of the five metric scores.

use tracing::info;

use crate::analysis::{
    AccelerationResult, AnalysisResult, EmotionalFeedback, NormalizationDiagnostics, PauseResult,
    ResponseTimeResult, SpeechRateResult, VolumeResult,
};
use crate::config::{MetricConfigSet, MetricId};

/// Per-metric outputs waiting to be combined.
#[derive(Debug, Clone)]
pub struct MetricResults {
    pub volume: VolumeResult,
    pub speech_rate: SpeechRateResult,
    pub acceleration: AccelerationResult,
    pub response_time: ResponseTimeResult,
    pub pauses: PauseResult,
}

impl MetricResults {
    fn score(&self, id: MetricId) -> f64 {
        match id {
            MetricId::Volume => self.volume.score,
            MetricId::SpeechRate => self.speech_rate.score,
            MetricId::Acceleration => self.acceleration.score,
            MetricId::ResponseTime => self.response_time.score,
            MetricId::Pauses => self.pauses.score,
        }
    }
}

/// Borrows the active configuration for the duration of one aggregation.
pub struct ScoreAggregator<'a> {
    config: &'a MetricConfigSet,
}

impl<'a> ScoreAggregator<'a> {
    pub fn new(config: &'a MetricConfigSet) -> Self {
        Self { config }
    }

    /// `round(Σ score·weight)` over enabled metrics, clamped to [0, 100].
    pub fn overall_score(&self, results: &MetricResults) -> f64 {
        let total: f64 = MetricId::ALL
            .iter()
            .map(|&id| results.score(id) * self.config.normalized_weight(id))
            .sum();
        if total.is_nan() {
            return 0.0;
        }
        total.round().clamp(0.0, 100.0)
    }

    pub fn aggregate(
        &self,
        results: MetricResults,
        normalization: Option<NormalizationDiagnostics>,
    ) -> AnalysisResult {
        let overall_score = self.overall_score(&results);
        let emotional_feedback = EmotionalFeedback::from_score(overall_score);
        info!(overall_score, ?emotional_feedback, "analysis scored");
        AnalysisResult {
            volume: results.volume,
            speech_rate: results.speech_rate,
            acceleration: results.acceleration,
            response_time: results.response_time,
            pauses: results.pauses,
            overall_score,
            emotional_feedback,
            normalization,
        }
    }
}
