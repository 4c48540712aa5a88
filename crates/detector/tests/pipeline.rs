use detector::{
    AccessPolicy, DecodedFrame, DetectError, DetectionPipeline, DetectorConfig, InferenceBackend,
    ModelHandle, RawDetection,
};
use std::io::Cursor;
use std::sync::Arc;

fn test_config() -> DetectorConfig {
    DetectorConfig {
        model_path: "models/rtdetr.onnx".to_string(),
        input_size: (640, 640),
        confidence_threshold: 0.5,
        iou_threshold: 0.45,
        max_upload_bytes: 10_000_000,
        request_timeout_ms: 0,
        model_access: AccessPolicy::Parallel,
    }
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([30, 60, 90]));
    let mut cursor = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut cursor, image::ImageFormat::Png)
        .unwrap();
    cursor.into_inner()
}

/// Backend returning a canned candidate list regardless of input.
struct CannedBackend {
    detections: Vec<RawDetection>,
}

impl InferenceBackend for CannedBackend {
    fn load_model(_path: &str, _input_size: (u32, u32)) -> anyhow::Result<Self> {
        Ok(Self {
            detections: Vec::new(),
        })
    }

    fn infer(&self, _frame: &DecodedFrame) -> anyhow::Result<Vec<RawDetection>> {
        Ok(self.detections.clone())
    }
}

fn ready_pipeline(detections: Vec<RawDetection>) -> DetectionPipeline<CannedBackend> {
    let handle = Arc::new(ModelHandle::with_backend(
        "models/rtdetr.onnx",
        CannedBackend { detections },
    ));
    DetectionPipeline::new(test_config(), handle)
}

fn raw(
    x_min: f32,
    y_min: f32,
    x_max: f32,
    y_max: f32,
    class_id: u32,
    confidence: f32,
) -> RawDetection {
    RawDetection {
        x_min,
        y_min,
        x_max,
        y_max,
        class_id,
        confidence,
    }
}

#[tokio::test]
async fn test_detect_end_to_end_with_nms() {
    // Two overlapping same-class candidates; the weaker must be suppressed
    // and the survivor clipped to the 2000x1000 frame
    let pipeline = ready_pipeline(vec![
        raw(100.0, 100.0, 500.0, 544.0, 16, 0.9),
        raw(100.0, 100.0, 500.0, 500.0, 16, 0.6),
        raw(-20.0, 900.0, 600.0, 1100.0, 0, 0.8),
    ]);

    let result = pipeline
        .detect(png_bytes(2000, 1000), Some("image/png"), None, None)
        .await
        .unwrap();

    assert_eq!(result.num_detections, 2);
    assert_eq!(result.image_dimensions, (2000, 1000));
    assert_eq!(result.model_name, "models/rtdetr.onnx");

    assert_eq!(result.detections[0].class_name, "dog");
    assert_eq!(result.detections[0].confidence, 0.9);

    let person = &result.detections[1];
    assert_eq!(person.class_name, "person");
    assert_eq!(person.bbox.x_min, 0.0, "box must be clipped to frame");
    assert_eq!(person.bbox.y_max, 1000.0);

    assert!(result.inference_time_ms >= 0.0);
}

#[tokio::test]
async fn test_empty_model_output_is_valid_empty_result() {
    let pipeline = ready_pipeline(Vec::new());

    let result = pipeline
        .detect(png_bytes(64, 48), Some("image/png"), None, None)
        .await
        .unwrap();

    assert_eq!(result.num_detections, 0);
    assert!(result.detections.is_empty());
}

#[tokio::test]
async fn test_threshold_overrides_apply_per_request() {
    let pipeline = ready_pipeline(vec![
        raw(0.0, 0.0, 10.0, 10.0, 0, 0.7),
        raw(20.0, 20.0, 30.0, 30.0, 1, 0.3),
    ]);

    let strict = pipeline
        .detect(png_bytes(64, 48), Some("image/png"), Some(0.8), None)
        .await
        .unwrap();
    assert_eq!(strict.num_detections, 0);

    let lenient = pipeline
        .detect(png_bytes(64, 48), Some("image/png"), Some(0.2), None)
        .await
        .unwrap();
    assert_eq!(lenient.num_detections, 2);
}

#[tokio::test]
async fn test_out_of_range_threshold_is_rejected_before_decode() {
    let pipeline = ready_pipeline(Vec::new());

    // Garbage bytes on purpose: config validation must fire first
    let err = pipeline
        .detect(vec![0u8; 16], Some("image/png"), Some(1.7), None)
        .await
        .unwrap_err();

    assert!(matches!(err, DetectError::InvalidConfig(_)));
}

#[tokio::test]
async fn test_oversize_upload_rejected_before_decode() {
    let pipeline = ready_pipeline(Vec::new());

    let err = pipeline
        .detect(vec![0u8; 11_000_000], Some("image/png"), None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, DetectError::InvalidInput(_)));
    assert!(err.to_string().contains("exceeds"));
}

#[tokio::test]
async fn test_non_image_content_type_rejected() {
    let pipeline = ready_pipeline(Vec::new());

    let err = pipeline
        .detect(b"plain text".to_vec(), Some("text/plain"), None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, DetectError::InvalidInput(_)));
}

#[tokio::test]
async fn test_detect_against_unloaded_model_fails_fast() {
    let handle = Arc::new(ModelHandle::<CannedBackend>::new("models/rtdetr.onnx"));
    let pipeline = DetectionPipeline::new(test_config(), handle);
    assert!(!pipeline.is_ready());

    let err = pipeline
        .detect(png_bytes(32, 32), Some("image/png"), None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, DetectError::ServiceNotReady(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_requests_get_independent_results() {
    // Each request uses a different confidence override against a spread of
    // candidate scores; the counts must match per request
    let candidates: Vec<RawDetection> = (0..10)
        .map(|i| {
            raw(
                (i * 50) as f32,
                0.0,
                (i * 50 + 40) as f32,
                40.0,
                i as u32,
                0.05 + 0.1 * i as f32,
            )
        })
        .collect();
    let pipeline = Arc::new(ready_pipeline(candidates));

    let mut tasks = Vec::new();
    for i in 0..10usize {
        let pipeline = pipeline.clone();
        tasks.push(tokio::spawn(async move {
            let threshold = 0.05 + 0.1 * i as f32;
            let result = pipeline
                .detect(png_bytes(640, 480), Some("image/png"), Some(threshold), None)
                .await
                .unwrap();
            (i, result.num_detections)
        }));
    }

    for task in tasks {
        let (i, count) = task.await.unwrap();
        assert_eq!(count, 10 - i, "request {i} saw another request's results");
    }
}
