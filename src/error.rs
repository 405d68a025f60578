use thiserror::Error;

/// Failures that abort a request (or startup, for `Configuration`).
/// Image and explanation problems are not errors; see `VisualOutcome` and `ExplanationOutcome`.
#[derive(Debug, Error)]
pub enum DiagnosisError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("inference error: {0}")]
    Inference(String),
    #[error("invalid reading: {0}")]
    InvalidReading(String),
}

impl DiagnosisError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Inference(_) => "inference",
            Self::InvalidReading(_) => "invalid_reading",
        }
    }

    /// Wrap a loader error, keeping the full context chain.
    pub(crate) fn config(err: anyhow::Error) -> Self {
        Self::Configuration(format!("{:#}", err))
    }
}
