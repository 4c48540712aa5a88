use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Axis-aligned rectangle in pixel coordinates of the original image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

/// A single detected object, clipped to image bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Final response payload: detections ordered by descending confidence,
/// with timing metadata. Built once per request and serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    pub detections: Vec<Detection>,
    pub num_detections: usize,
    pub inference_time_ms: f64,
    pub image_dimensions: (u32, u32),
    pub model_name: String,
}

/// Assemble the response. Pure construction; an empty detection list is a
/// valid, non-error result.
///
/// `elapsed` must cover executor start through postprocess end, not decode
/// or network transfer.
pub fn assemble(
    detections: Vec<Detection>,
    dimensions: (u32, u32),
    elapsed: Duration,
    model_name: &str,
) -> DetectionResult {
    DetectionResult {
        num_detections: detections.len(),
        detections,
        inference_time_ms: elapsed.as_secs_f64() * 1000.0,
        image_dimensions: dimensions,
        model_name: model_name.to_string(),
    }
}
