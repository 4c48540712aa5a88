use crate::decode::DecodedFrame;
use crate::postprocess::RawDetection;

#[cfg(feature = "ort-backend")]
pub mod ort;

/// The opaque model capability. Implementations own the loaded artifact and
/// expose a pure function of the input frame: candidates come back with
/// absolute pixel coordinates in the original frame and raw, unfiltered
/// confidence scores. Thresholding and suppression happen downstream, never
/// here.
///
/// `infer` takes `&self` and implementations must be safe to call from
/// multiple threads; a backend that needs exclusive access to its native
/// session serializes internally (see `ort::OrtBackend`) or is run under the
/// executor's serialized access policy.
pub trait InferenceBackend: Send + Sync + 'static {
    fn load_model(path: &str, input_size: (u32, u32)) -> anyhow::Result<Self>
    where
        Self: Sized;

    fn infer(&self, frame: &DecodedFrame) -> anyhow::Result<Vec<RawDetection>>;
}
