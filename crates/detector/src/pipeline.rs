use crate::backend::InferenceBackend;
use crate::config::{DetectorConfig, RequestConfig};
use crate::decode::ImageDecoder;
use crate::error::DetectError;
use crate::executor::InferenceExecutor;
use crate::model::ModelHandle;
use crate::postprocess::filter_detections;
use crate::response::{DetectionResult, assemble};
use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
};
use std::sync::Arc;
use std::time::Instant;

fn init_metrics(meter_name: &'static str) -> (Histogram<f64>, Counter<u64>, Counter<u64>) {
    let meter = global::meter(meter_name);
    let latency_buckets = [
        0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 0.75, 1.0, 2.0, 5.0,
    ];
    let duration_histogram: Histogram<f64> = meter
        .f64_histogram("detect_request_duration_seconds")
        .with_description("Time to serve a detection request (infer + postprocess)")
        .with_unit("s")
        .with_boundaries(latency_buckets.to_vec())
        .build();
    let requests_counter: Counter<u64> = meter
        .u64_counter("detect_requests_total")
        .with_description("Total detection requests processed")
        .build();
    let detections_counter: Counter<u64> = meter
        .u64_counter("detect_detections_total")
        .with_description("Total detections produced")
        .build();

    (duration_histogram, requests_counter, detections_counter)
}

/// Composes decode, inference and postprocessing into one request-scoped
/// operation with validation, timing and error mapping.
///
/// Per request the stages run strictly in order: validate thresholds,
/// validate and decode the upload, infer, filter, assemble. Validation
/// failures reject the request before any CPU-bound work is dispatched. A
/// request that arrives while the model is still loading fails fast with
/// `ServiceNotReady` rather than queueing behind the load; callers are
/// expected to retry. Nothing is retried automatically here.
pub struct DetectionPipeline<B> {
    config: DetectorConfig,
    handle: Arc<ModelHandle<B>>,
    executor: InferenceExecutor,
    decoder: ImageDecoder,
    duration_histogram: Histogram<f64>,
    requests_counter: Counter<u64>,
    detections_counter: Counter<u64>,
}

impl<B: InferenceBackend> DetectionPipeline<B> {
    pub fn new(config: DetectorConfig, handle: Arc<ModelHandle<B>>) -> Self {
        let executor = InferenceExecutor::new(config.request_timeout(), config.model_access);
        let decoder = ImageDecoder::new(config.max_upload_bytes);
        let (duration_histogram, requests_counter, detections_counter) = init_metrics("detector");

        Self {
            config,
            handle,
            executor,
            decoder,
            duration_histogram,
            requests_counter,
            detections_counter,
        }
    }

    /// Load the model this pipeline runs against. Safe to call concurrently;
    /// see [`ModelHandle::load`].
    pub async fn load_model(&self) -> Result<(), DetectError> {
        self.handle
            .load(&self.config.model_path, self.config.input_size)
            .await
    }

    pub fn is_ready(&self) -> bool {
        self.handle.is_ready()
    }

    pub fn model_id(&self) -> &str {
        self.handle.model_id()
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.config.max_upload_bytes
    }

    /// Run one upload through the full pipeline.
    #[tracing::instrument(skip(self, bytes), fields(upload_bytes = bytes.len()))]
    pub async fn detect(
        &self,
        bytes: Vec<u8>,
        content_type: Option<&str>,
        confidence: Option<f32>,
        iou: Option<f32>,
    ) -> Result<DetectionResult, DetectError> {
        let request = RequestConfig::resolve(&self.config, confidence, iou)?;
        self.decoder.validate(bytes.len(), content_type)?;

        // Decoding is CPU-bound; it shares the offload pool with inference
        let decoder = self.decoder;
        let declared = content_type.map(str::to_string);
        let frame = tokio::task::spawn_blocking(move || decoder.decode(&bytes, declared.as_deref()))
            .await
            .map_err(|e| DetectError::Inference(format!("decode task failed: {e}")))??;

        let dimensions = frame.dimensions();

        let start = Instant::now();
        let raw = self.executor.run(&self.handle, frame).await?;
        let detections = filter_detections(
            &raw,
            request.confidence_threshold,
            request.iou_threshold,
            dimensions.0,
            dimensions.1,
        );
        let elapsed = start.elapsed();

        self.duration_histogram.record(elapsed.as_secs_f64(), &[]);
        self.requests_counter.add(1, &[]);
        self.detections_counter.add(detections.len() as u64, &[]);

        tracing::info!(
            num_detections = detections.len(),
            raw_candidates = raw.len(),
            inference_ms = elapsed.as_secs_f64() * 1000.0,
            width = dimensions.0,
            height = dimensions.1,
            "Detection complete"
        );

        Ok(assemble(
            detections,
            dimensions,
            elapsed,
            self.handle.model_id(),
        ))
    }
}
