use thiserror::Error;

/// Crate-wide error type. Variants line up with the failure kinds a caller
/// needs to branch on: bad input, exhausted backend resources, a backend
/// reporting failure mid-dispatch, I/O during import/export, and cooperative
/// cancellation of a training run.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("backend failure during {stage}: {message}")]
    BackendFailure { stage: String, message: String },

    #[error("io failure: {0}")]
    IoFailure(#[from] std::io::Error),

    #[error("training cancelled")]
    Cancelled,
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn backend(stage: &str, message: impl std::fmt::Display) -> Self {
        EngineError::BackendFailure {
            stage: stage.to_string(),
            message: message.to_string(),
        }
    }
}
