use thiserror::Error;

/// All errors produced by vigor-core.
///
/// The analysis path itself never returns these; they surface from store
/// plumbing, the calibration wizard and external transcription.
#[derive(Debug, Error)]
pub enum VigorError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("transcription error: {0}")]
    Transcription(String),

    #[error("transcription timed out after {secs:.1}s")]
    TranscriptionTimeout { secs: f64 },

    #[error("calibration error: {0}")]
    Calibration(String),

    #[error("unknown metric: {0}")]
    UnknownMetric(String),

    #[error("no calibration profile for device '{0}'")]
    ProfileNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, VigorError>;
