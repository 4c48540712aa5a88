use crate::labels;
use crate::response::{BoundingBox, Detection};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// One raw candidate from the model: box in absolute pixel coordinates of
/// the original frame, class index, unfiltered confidence in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
    pub class_id: u32,
    pub confidence: f32,
}

impl RawDetection {
    fn area(&self) -> f32 {
        (self.x_max - self.x_min).max(0.0) * (self.y_max - self.y_min).max(0.0)
    }
}

/// Intersection over union of two axis-aligned boxes. Disjoint boxes have
/// IoU 0; exact duplicates have IoU 1.
pub fn iou(a: &RawDetection, b: &RawDetection) -> f32 {
    let ix = (a.x_max.min(b.x_max) - a.x_min.max(b.x_min)).max(0.0);
    let iy = (a.y_max.min(b.y_max) - a.y_min.max(b.y_min)).max(0.0);
    let intersection = ix * iy;
    let union = a.area() + b.area() - intersection;
    if union <= 0.0 { 0.0 } else { intersection / union }
}

/// Confidence filter plus greedy per-class NMS.
///
/// Suppression never crosses classes: two overlapping boxes of different
/// classes are both kept. Within a class, the highest-confidence box is
/// emitted and every remaining box with IoU >= `iou_threshold` against it is
/// dropped. With `iou_threshold` of 0 this keeps at most one box per class,
/// since even disjoint boxes have IoU 0.
///
/// Output is ordered by descending confidence, ties broken by the original
/// emission order. Re-running on its own output is a fixed point.
pub(crate) fn suppress(
    raw: &[RawDetection],
    confidence_threshold: f32,
    iou_threshold: f32,
) -> Vec<RawDetection> {
    let mut groups: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (i, det) in raw.iter().enumerate() {
        if det.confidence >= confidence_threshold {
            groups.entry(det.class_id).or_default().push(i);
        }
    }

    let mut kept: Vec<usize> = Vec::new();
    for mut group in groups.into_values() {
        group.sort_by(|&a, &b| compare_by_confidence(raw, a, b));

        let mut suppressed = vec![false; group.len()];
        for i in 0..group.len() {
            if suppressed[i] {
                continue;
            }
            kept.push(group[i]);
            for j in (i + 1)..group.len() {
                if !suppressed[j] && iou(&raw[group[i]], &raw[group[j]]) >= iou_threshold {
                    suppressed[j] = true;
                }
            }
        }
    }

    kept.sort_by(|&a, &b| compare_by_confidence(raw, a, b));
    kept.into_iter().map(|i| raw[i]).collect()
}

fn compare_by_confidence(raw: &[RawDetection], a: usize, b: usize) -> Ordering {
    raw[b]
        .confidence
        .partial_cmp(&raw[a].confidence)
        .unwrap_or(Ordering::Equal)
        .then(a.cmp(&b))
}

/// Full postprocessing: threshold, per-class NMS, clip to frame bounds and
/// resolve class names. Empty input yields empty output, not an error.
pub fn filter_detections(
    raw: &[RawDetection],
    confidence_threshold: f32,
    iou_threshold: f32,
    width: u32,
    height: u32,
) -> Vec<Detection> {
    suppress(raw, confidence_threshold, iou_threshold)
        .into_iter()
        .map(|d| Detection {
            class_name: labels::class_name(d.class_id).to_string(),
            confidence: d.confidence,
            bbox: BoundingBox {
                x_min: d.x_min.clamp(0.0, width as f32),
                y_min: d.y_min.clamp(0.0, height as f32),
                x_max: d.x_max.clamp(0.0, width as f32),
                y_max: d.y_max.clamp(0.0, height as f32),
            },
        })
        .collect()
}
