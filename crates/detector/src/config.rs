use crate::error::DetectError;
use crate::executor::AccessPolicy;
use std::env;
use std::time::Duration;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10_000_000;
pub const DEFAULT_INPUT_SIZE: (u32, u32) = (640, 640);

/// Immutable configuration snapshot for the detection pipeline, read once at
/// startup.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub model_path: String,
    pub input_size: (u32, u32),
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_upload_bytes: usize,
    pub request_timeout_ms: u64,
    pub model_access: AccessPolicy,
}

impl DetectorConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> anyhow::Result<Self> {
        let model_path =
            env::var("MODEL_PATH").unwrap_or_else(|_| "models/rtdetr.onnx".to_string());

        let input_width = env::var("MODEL_INPUT_WIDTH")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_INPUT_SIZE.0);

        let input_height = env::var("MODEL_INPUT_HEIGHT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_INPUT_SIZE.1);

        let confidence_threshold = env::var("CONFIDENCE_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD);

        let iou_threshold = env::var("IOU_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_IOU_THRESHOLD);

        let max_upload_bytes = env::var("MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        let request_timeout_ms = env::var("REQUEST_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30_000);

        let model_access = match env::var("MODEL_ACCESS")
            .unwrap_or_else(|_| "parallel".to_string())
            .to_lowercase()
            .as_str()
        {
            "serialized" | "serial" => AccessPolicy::Serialized,
            _ => AccessPolicy::Parallel,
        };

        let config = Self {
            model_path,
            input_size: (input_width, input_height),
            confidence_threshold,
            iou_threshold,
            max_upload_bytes,
            request_timeout_ms,
            model_access,
        };

        RequestConfig::resolve(&config, None, None)
            .map_err(|e| anyhow::anyhow!("invalid default thresholds: {e}"))?;

        Ok(config)
    }

    /// A timeout of zero disables the request deadline.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }

    /// Create default configuration for testing
    #[cfg(test)]
    pub fn test_default() -> Self {
        Self {
            model_path: "models/rtdetr.onnx".to_string(),
            input_size: DEFAULT_INPUT_SIZE,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            request_timeout_ms: 0,
            model_access: AccessPolicy::Parallel,
        }
    }
}

/// Per-request threshold overrides, resolved against the configured defaults
/// and range-checked before the pipeline runs. Immutable for the lifetime of
/// the request.
#[derive(Debug, Clone, Copy)]
pub struct RequestConfig {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
}

impl RequestConfig {
    pub fn resolve(
        defaults: &DetectorConfig,
        confidence: Option<f32>,
        iou: Option<f32>,
    ) -> Result<Self, DetectError> {
        let confidence_threshold = confidence.unwrap_or(defaults.confidence_threshold);
        let iou_threshold = iou.unwrap_or(defaults.iou_threshold);

        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(DetectError::InvalidConfig(format!(
                "confidence threshold must be within [0, 1], got {confidence_threshold}"
            )));
        }
        if !(0.0..=1.0).contains(&iou_threshold) {
            return Err(DetectError::InvalidConfig(format!(
                "iou threshold must be within [0, 1], got {iou_threshold}"
            )));
        }

        Ok(Self {
            confidence_threshold,
            iou_threshold,
        })
    }
}
