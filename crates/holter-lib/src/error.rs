use thiserror::Error;

/// Failures raised by the PVC detection stages.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PvcError {
    /// Not enough beats or samples to form the requested statistic.
    #[error("insufficient data: {0}")]
    InsufficientData(String),
    /// A parameter lies outside the range the stage can work with.
    #[error("parameter out of range: {0}")]
    ParameterRange(String),
    /// The baseline window is longer than the recording itself.
    #[error("window of {window_s} s exceeds recording duration of {duration_s:.3} s")]
    WindowTooLarge { window_s: f64, duration_s: f64 },
}

pub type PvcResult<T> = std::result::Result<T, PvcError>;

impl PvcError {
    pub(crate) fn insufficient(msg: impl Into<String>) -> Self {
        Self::InsufficientData(msg.into())
    }

    pub(crate) fn range(msg: impl Into<String>) -> Self {
        Self::ParameterRange(msg.into())
    }
}
