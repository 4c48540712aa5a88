use super::InferenceBackend;
use crate::decode::DecodedFrame;
use crate::postprocess::RawDetection;
use crate::preprocess::{Preprocessed, preprocess_frame};
use ndarray::{Array, IxDyn};
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};
use std::sync::{Mutex, PoisonError};

/// ONNX Runtime backend for RT-DETR style detection models.
///
/// Expects a model with `images` / `orig_target_sizes` inputs and
/// `labels` / `boxes` / `scores` outputs, boxes in xyxy pixel coordinates of
/// the letterboxed input. Candidates are returned raw: no confidence
/// filtering, no suppression.
///
/// `ort` sessions require exclusive access to run, so the session sits
/// behind a mutex; concurrent `infer` calls serialize at that point.
pub struct OrtBackend {
    session: Mutex<Session>,
    input_size: (u32, u32),
}

impl InferenceBackend for OrtBackend {
    fn load_model(path: &str, input_size: (u32, u32)) -> anyhow::Result<Self> {
        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(path)?;

        tracing::info!("Model loaded from {}", path);

        Ok(Self {
            session: Mutex::new(session),
            input_size,
        })
    }

    fn infer(&self, frame: &DecodedFrame) -> anyhow::Result<Vec<RawDetection>> {
        let Preprocessed {
            tensor,
            scale,
            offset_x,
            offset_y,
        } = preprocess_frame(frame, self.input_size)?;

        let sizes: Array<i64, IxDyn> = Array::from_shape_vec(
            IxDyn(&[1, 2]),
            vec![self.input_size.0 as i64, self.input_size.1 as i64],
        )?;

        let (labels, boxes, scores) = {
            let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
            let outputs = session.run(ort::inputs![
                "images" => TensorRef::from_array_view(tensor.view())?,
                "orig_target_sizes" => TensorRef::from_array_view(sizes.view())?
            ])?;

            let labels: ndarray::ArrayViewD<i64> = outputs["labels"].try_extract_array()?;
            let boxes: ndarray::ArrayViewD<f32> = outputs["boxes"].try_extract_array()?;
            let scores: ndarray::ArrayViewD<f32> = outputs["scores"].try_extract_array()?;

            (labels.into_owned(), boxes.into_owned(), scores.into_owned())
        };

        parse_raw_detections(
            &labels.view(),
            &boxes.view(),
            &scores.view(),
            scale,
            offset_x,
            offset_y,
        )
    }
}

/// Map model output from letterboxed input coordinates back to original
/// frame coordinates. Confidence scores pass through untouched; clipping is
/// the postprocessor's job.
fn parse_raw_detections(
    labels: &ndarray::ArrayViewD<i64>,
    boxes: &ndarray::ArrayViewD<f32>,
    scores: &ndarray::ArrayViewD<f32>,
    scale: f32,
    offset_x: f32,
    offset_y: f32,
) -> anyhow::Result<Vec<RawDetection>> {
    let num_queries = labels.shape()[1];
    let mut detections = Vec::with_capacity(num_queries);

    for i in 0..num_queries {
        let class_id = labels[[0, i]];
        if class_id < 0 {
            continue;
        }

        let x_min = (boxes[[0, i, 0]] - offset_x) / scale;
        let y_min = (boxes[[0, i, 1]] - offset_y) / scale;
        let x_max = (boxes[[0, i, 2]] - offset_x) / scale;
        let y_max = (boxes[[0, i, 3]] - offset_y) / scale;

        if x_min >= x_max || y_min >= y_max {
            continue;
        }

        detections.push(RawDetection {
            x_min,
            y_min,
            x_max,
            y_max,
            class_id: class_id as u32,
            confidence: scores[[0, i]],
        });
    }

    Ok(detections)
}
