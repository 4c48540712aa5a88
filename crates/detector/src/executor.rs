use crate::backend::InferenceBackend;
use crate::decode::DecodedFrame;
use crate::error::DetectError;
use crate::model::ModelHandle;
use crate::postprocess::RawDetection;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// How concurrent requests may enter the model.
///
/// `Parallel` lets inference calls run side by side; use `Serialized` for
/// backends documented as not thread-safe, which routes every call through a
/// single-permit gate instead of leaving the serialization accidental.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPolicy {
    Parallel,
    Serialized,
}

/// Runs the CPU/GPU-bound forward pass on the blocking pool so the async
/// front door never stalls behind it.
pub struct InferenceExecutor {
    timeout: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
}

impl InferenceExecutor {
    pub fn new(timeout: Option<Duration>, policy: AccessPolicy) -> Self {
        let gate = match policy {
            AccessPolicy::Parallel => None,
            AccessPolicy::Serialized => Some(Arc::new(Semaphore::new(1))),
        };
        Self { timeout, gate }
    }

    /// Dispatch one inference call against a `Ready` model.
    ///
    /// On deadline expiry the caller gets `InferenceTimeout` immediately; the
    /// already-dispatched native computation is not forcibly cancelled and
    /// finishes in the background. Under `Serialized` the permit travels into
    /// the blocking task, so the next call cannot enter until the computation
    /// itself has finished, timeout or not.
    pub async fn run<B: InferenceBackend>(
        &self,
        handle: &ModelHandle<B>,
        frame: DecodedFrame,
    ) -> Result<Vec<RawDetection>, DetectError> {
        let backend = handle.backend()?;

        let permit = match &self.gate {
            Some(gate) => Some(
                gate.clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| DetectError::Inference("inference gate closed".to_string()))?,
            ),
            None => None,
        };

        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            backend.infer(&frame)
        });

        let joined = match self.timeout {
            Some(deadline) => tokio::time::timeout(deadline, task)
                .await
                .map_err(|_| DetectError::InferenceTimeout(deadline))?,
            None => task.await,
        };

        match joined {
            Ok(Ok(detections)) => Ok(detections),
            Ok(Err(e)) => Err(DetectError::Inference(format!("{e:#}"))),
            Err(e) => Err(DetectError::Inference(format!(
                "inference task failed: {e}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn frame(width: u32, height: u32) -> DecodedFrame {
        DecodedFrame {
            pixels: vec![0u8; (width * height * 3) as usize],
            width,
            height,
        }
    }

    /// Echoes frame width into the detection so per-request results are
    /// distinguishable under concurrency.
    struct EchoBackend {
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl EchoBackend {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    impl InferenceBackend for EchoBackend {
        fn load_model(_path: &str, _input_size: (u32, u32)) -> anyhow::Result<Self> {
            Ok(Self::new(Duration::ZERO))
        }

        fn infer(&self, frame: &DecodedFrame) -> anyhow::Result<Vec<RawDetection>> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            Ok(vec![RawDetection {
                x_min: 0.0,
                y_min: 0.0,
                x_max: frame.width as f32,
                y_max: frame.height as f32,
                class_id: 0,
                confidence: 0.9,
            }])
        }
    }

    struct BrokenBackend;

    impl InferenceBackend for BrokenBackend {
        fn load_model(_path: &str, _input_size: (u32, u32)) -> anyhow::Result<Self> {
            Ok(Self)
        }

        fn infer(&self, _frame: &DecodedFrame) -> anyhow::Result<Vec<RawDetection>> {
            anyhow::bail!("numeric overflow in model head")
        }
    }

    #[tokio::test]
    async fn test_run_returns_backend_output() {
        let handle = ModelHandle::with_backend("m", EchoBackend::new(Duration::ZERO));
        let executor = InferenceExecutor::new(None, AccessPolicy::Parallel);

        let dets = executor.run(&handle, frame(64, 32)).await.unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].x_max, 64.0);
    }

    #[tokio::test]
    async fn test_not_ready_is_rejected_before_dispatch() {
        let handle = ModelHandle::<EchoBackend>::new("m");
        let executor = InferenceExecutor::new(None, AccessPolicy::Parallel);

        let err = executor.run(&handle, frame(8, 8)).await.unwrap_err();
        assert!(matches!(err, DetectError::ServiceNotReady(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_timeout_reports_without_blocking_caller() {
        let handle = Arc::new(ModelHandle::with_backend(
            "m",
            EchoBackend::new(Duration::from_millis(500)),
        ));
        let executor = InferenceExecutor::new(
            Some(Duration::from_millis(30)),
            AccessPolicy::Parallel,
        );

        let start = Instant::now();
        let err = executor.run(&handle, frame(8, 8)).await.unwrap_err();

        assert!(matches!(err, DetectError::InferenceTimeout(_)));
        assert!(
            start.elapsed() < Duration::from_millis(300),
            "caller must get the timeout well before the computation finishes"
        );

        // The handle stays usable for subsequent requests
        assert!(handle.backend().is_ok());
    }

    #[tokio::test]
    async fn test_backend_failure_maps_to_inference_error() {
        let handle = ModelHandle::with_backend("m", BrokenBackend);
        let executor = InferenceExecutor::new(None, AccessPolicy::Parallel);

        let err = executor.run(&handle, frame(8, 8)).await.unwrap_err();
        assert!(matches!(err, DetectError::Inference(_)));
        assert!(err.to_string().contains("numeric overflow"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_parallel_requests_do_not_cross_talk() {
        let handle = Arc::new(ModelHandle::with_backend(
            "m",
            EchoBackend::new(Duration::from_millis(10)),
        ));
        let executor = Arc::new(InferenceExecutor::new(None, AccessPolicy::Parallel));

        let mut tasks = Vec::new();
        for i in 1..=16u32 {
            let handle = handle.clone();
            let executor = executor.clone();
            tasks.push(tokio::spawn(async move {
                let dets = executor.run(&handle, frame(i * 10, i)).await.unwrap();
                (i, dets)
            }));
        }

        for task in tasks {
            let (i, dets) = task.await.unwrap();
            assert_eq!(dets.len(), 1);
            assert_eq!(dets[0].x_max, (i * 10) as f32, "result crossed requests");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_serialized_policy_admits_one_at_a_time() {
        let backend = EchoBackend::new(Duration::from_millis(20));
        let handle = Arc::new(ModelHandle::with_backend("m", backend));
        let executor = Arc::new(InferenceExecutor::new(None, AccessPolicy::Serialized));

        let mut tasks = Vec::new();
        for _ in 0..6 {
            let handle = handle.clone();
            let executor = executor.clone();
            tasks.push(tokio::spawn(async move {
                executor.run(&handle, frame(8, 8)).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let max = handle.backend().unwrap().max_in_flight.load(Ordering::SeqCst);
        assert_eq!(max, 1, "serialized policy must never admit two calls");
    }
}
