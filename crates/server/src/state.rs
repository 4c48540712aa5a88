use detector::DetectionPipeline;
use std::sync::Arc;

/// Shared application state handed to every request handler. Generic over
/// the inference backend so tests can run against a mock model.
pub struct AppState<B> {
    pub pipeline: Arc<DetectionPipeline<B>>,
}

// Derived Clone would require B: Clone; the Arc is all that is cloned
impl<B> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
        }
    }
}
