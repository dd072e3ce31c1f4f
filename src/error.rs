use thiserror::Error;

/// Failures surfaced by the spectrogram engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// The source signal cannot be analysed yet.
    #[error("source signal is not ready")]
    ModelNotReady,

    /// The transform frame store could not be allocated.
    #[error("failed to create the FFT model for this spectrogram: {0}")]
    TransformAllocationFailure(String),

    /// A setter received a value outside its domain; prior state is kept.
    #[error("invalid {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

impl EngineError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
