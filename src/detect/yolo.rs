//! Post-processing for YOLOv8-style detection heads.
//!
//! The head emits a `[1, 4 + classes, anchors]` tensor: rows 0..4 hold box
//! centre/size in model input pixels, the remaining rows hold per-class scores.

use anyhow::{anyhow, Result};

use super::result::{BoundingBox, RawDetection};

pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

/// Decode a row-major `[channels, anchors]` buffer into raw detections.
///
/// `scale_x`/`scale_y` map model input pixels back to frame pixels.
pub fn decode_output(
    values: &[f32],
    channels: usize,
    anchors: usize,
    confidence_threshold: f32,
    scale_x: f32,
    scale_y: f32,
) -> Result<Vec<RawDetection>> {
    if channels <= 4 {
        return Err(anyhow!("yolo output needs more than 4 channels, got {}", channels));
    }
    if values.len() != channels * anchors {
        return Err(anyhow!(
            "yolo output length mismatch: expected {}, got {}",
            channels * anchors,
            values.len()
        ));
    }
    let at = |row: usize, col: usize| values[row * anchors + col];

    let mut detections = Vec::new();
    for col in 0..anchors {
        let (class_id, score) = (4..channels)
            .map(|row| (row - 4, at(row, col)))
            .fold((0usize, f32::NEG_INFINITY), |best, cur| {
                if cur.1 > best.1 {
                    cur
                } else {
                    best
                }
            });
        if !score.is_finite() || score < confidence_threshold {
            continue;
        }
        let (cx, cy, w, h) = (at(0, col), at(1, col), at(2, col), at(3, col));
        let bbox = BoundingBox::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
            .scaled(scale_x, scale_y);
        detections.push(RawDetection {
            bbox,
            class_id: class_id as u32,
            confidence: score.min(1.0),
        });
    }
    Ok(non_max_suppression(detections, DEFAULT_IOU_THRESHOLD))
}

/// Class-aware greedy NMS.
pub fn non_max_suppression(mut detections: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<RawDetection> = Vec::with_capacity(detections.len());
    for det in detections {
        let overlaps = kept
            .iter()
            .any(|k| k.class_id == det.class_id && k.bbox.iou(&det.bbox) > iou_threshold);
        if !overlaps {
            kept.push(det);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a `[6, anchors]` buffer (2 classes) from per-anchor tuples.
    fn head(anchors: &[(f32, f32, f32, f32, f32, f32)]) -> Vec<f32> {
        let n = anchors.len();
        let mut values = vec![0.0; 6 * n];
        for (col, a) in anchors.iter().enumerate() {
            let row = [a.0, a.1, a.2, a.3, a.4, a.5];
            for (r, v) in row.iter().enumerate() {
                values[r * n + col] = *v;
            }
        }
        values
    }

    #[test]
    fn decodes_best_class_above_threshold() -> Result<()> {
        let values = head(&[
            (50.0, 50.0, 20.0, 10.0, 0.1, 0.8),
            (10.0, 10.0, 4.0, 4.0, 0.2, 0.1),
        ]);
        let out = decode_output(&values, 6, 2, 0.25, 1.0, 1.0)?;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].class_id, 1);
        assert_eq!(out[0].bbox, BoundingBox::new(40.0, 45.0, 60.0, 55.0));
        Ok(())
    }

    #[test]
    fn scales_boxes_to_frame() -> Result<()> {
        let values = head(&[(64.0, 64.0, 64.0, 64.0, 0.9, 0.0)]);
        let out = decode_output(&values, 6, 1, 0.5, 0.5, 2.0)?;
        assert_eq!(out[0].bbox, BoundingBox::new(16.0, 64.0, 48.0, 192.0));
        Ok(())
    }

    #[test]
    fn nms_drops_overlapping_same_class() -> Result<()> {
        let values = head(&[
            (50.0, 50.0, 20.0, 20.0, 0.9, 0.0),
            (51.0, 50.0, 20.0, 20.0, 0.7, 0.0),
            (51.0, 50.0, 20.0, 20.0, 0.0, 0.6),
        ]);
        let out = decode_output(&values, 6, 3, 0.25, 1.0, 1.0)?;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].confidence, 0.9);
        assert_eq!(out[1].class_id, 1);
        Ok(())
    }

    #[test]
    fn rejects_mismatched_shapes() {
        assert!(decode_output(&[0.0; 10], 6, 2, 0.5, 1.0, 1.0).is_err());
        assert!(decode_output(&[0.0; 4], 4, 1, 0.5, 1.0, 1.0).is_err());
    }
}
