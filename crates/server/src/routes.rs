use crate::state::AppState;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Query, State, multipart::MultipartError},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use detector::{DetectError, DetectionResult, InferenceBackend};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;

// Multipart framing (boundaries, part headers) sits on top of the payload,
// so the transport limit needs headroom above the configured upload cap
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Build the application router over any inference backend.
pub fn app<B: InferenceBackend>(state: AppState<B>) -> Router {
    let body_limit = state.pipeline.max_upload_bytes() + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/", get(root::<B>))
        .route("/health", get(health::<B>))
        .route("/predict", post(predict::<B>))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// JSON error envelope with the HTTP status the error maps to.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, kind: &'static str, detail: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            detail: detail.into(),
        }
    }
}

// axum reports 413 for length-limit violations and 400 for malformed
// bodies; keep its status rather than flattening everything to 400
impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::new(
            err.status(),
            "invalid_input",
            format!("failed to read upload: {err}"),
        )
    }
}

impl From<DetectError> for ApiError {
    fn from(err: DetectError) -> Self {
        let status = match &err {
            DetectError::InvalidInput(_) | DetectError::InvalidConfig(_) => {
                StatusCode::BAD_REQUEST
            }
            DetectError::ServiceNotReady(_) | DetectError::ModelUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            DetectError::InferenceTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            DetectError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.kind(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::warn!(status = %self.status, error = self.kind, detail = %self.detail, "Request failed");
        let body = Json(json!({
            "error": self.kind,
            "detail": self.detail,
        }));
        (self.status, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct PredictParams {
    pub confidence: Option<f32>,
    pub iou_threshold: Option<f32>,
}

async fn predict<B: InferenceBackend>(
    State(state): State<AppState<B>>,
    Query(params): Query<PredictParams>,
    mut multipart: Multipart,
) -> Result<Json<DetectionResult>, ApiError> {
    let mut upload: Option<(Vec<u8>, Option<String>)> = None;

    while let Some(field) = multipart.next_field().await.map_err(ApiError::from)? {
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(ApiError::from)?;

        upload = Some((bytes.to_vec(), content_type));
        break;
    }

    let (bytes, content_type) = upload.ok_or_else(|| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "invalid_input",
            "multipart field 'file' is required",
        )
    })?;

    // Oversize is a payload problem, not a generic bad request
    if bytes.len() > state.pipeline.max_upload_bytes() {
        return Err(ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "invalid_input",
            format!(
                "upload of {} bytes exceeds the {} byte limit",
                bytes.len(),
                state.pipeline.max_upload_bytes()
            ),
        ));
    }

    let result = state
        .pipeline
        .detect(
            bytes,
            content_type.as_deref(),
            params.confidence,
            params.iou_threshold,
        )
        .await?;

    Ok(Json(result))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub model_name: String,
    pub version: String,
}

async fn health<B: InferenceBackend>(State(state): State<AppState<B>>) -> Json<HealthResponse> {
    let model_loaded = state.pipeline.is_ready();
    Json(HealthResponse {
        status: if model_loaded { "healthy" } else { "degraded" }.to_string(),
        model_loaded,
        model_name: state.pipeline.model_id().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn root<B: InferenceBackend>(State(state): State<AppState<B>>) -> Json<serde_json::Value> {
    Json(json!({
        "service": "object-detection-server",
        "version": env!("CARGO_PKG_VERSION"),
        "model": state.pipeline.model_id(),
        "endpoints": {
            "predict": "POST /predict",
            "health": "GET /health",
        },
    }))
}
