use std::time::Duration;
use thiserror::Error;

/// Error taxonomy for the detection pipeline.
///
/// Every variant carries a stable kind string (see [`DetectError::kind`]) so
/// callers can map errors without parsing messages. Input and configuration
/// errors are reported before any blocking work is dispatched; availability
/// errors (`ServiceNotReady`, `ModelUnavailable`) are kept distinct from
/// client errors so callers can tell "retry later" from "fix your request".
#[derive(Error, Debug)]
pub enum DetectError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("service not ready: {0}")]
    ServiceNotReady(String),

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("inference timed out after {0:?}")]
    InferenceTimeout(Duration),

    #[error("inference failed: {0}")]
    Inference(String),
}

impl DetectError {
    pub fn kind(&self) -> &'static str {
        match self {
            DetectError::InvalidInput(_) => "invalid_input",
            DetectError::InvalidConfig(_) => "invalid_config",
            DetectError::ServiceNotReady(_) => "service_not_ready",
            DetectError::ModelUnavailable(_) => "model_unavailable",
            DetectError::InferenceTimeout(_) => "inference_timeout",
            DetectError::Inference(_) => "inference_error",
        }
    }
}
