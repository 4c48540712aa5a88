pub mod backend;
pub mod config;
pub mod decode;
pub mod error;
pub mod executor;
pub mod labels;
pub mod model;
pub mod pipeline;
pub mod postprocess;
pub mod preprocess;
pub mod response;

// Re-export commonly used types for convenience
pub use backend::InferenceBackend;
pub use config::{DetectorConfig, RequestConfig};
pub use decode::{DecodedFrame, ImageDecoder};
pub use error::DetectError;
pub use executor::{AccessPolicy, InferenceExecutor};
pub use model::{LoadState, ModelHandle};
pub use pipeline::DetectionPipeline;
pub use postprocess::{RawDetection, filter_detections, iou};
pub use response::{BoundingBox, Detection, DetectionResult};
