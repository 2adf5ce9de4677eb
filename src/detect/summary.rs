use serde::Serialize;

use super::result::{Detection, Label};

/// Per-frame verdict derived from the labeled detections.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct DetectionSummary {
    pub fire_detected: bool,
    pub smoke_detected: bool,
    /// Mean fire confidence x 100, 0 when no fire was detected.
    pub average_fire_confidence: f64,
}

impl DetectionSummary {
    pub fn from_detections(detections: &[Detection]) -> Self {
        let mut fire_count = 0usize;
        let mut fire_sum = 0.0f64;
        let mut smoke_detected = false;
        for det in detections {
            match det.label {
                Label::Fire => {
                    fire_count += 1;
                    fire_sum += det.confidence as f64;
                }
                Label::Smoke => smoke_detected = true,
            }
        }
        let average_fire_confidence = if fire_count == 0 {
            0.0
        } else {
            fire_sum / fire_count as f64 * 100.0
        };
        Self {
            fire_detected: fire_count > 0,
            smoke_detected,
            average_fire_confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;

    fn det(label: Label, confidence: f32) -> Detection {
        Detection {
            bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            label,
            confidence,
        }
    }

    #[test]
    fn empty_summary_is_zero() {
        let summary = DetectionSummary::from_detections(&[]);
        assert_eq!(summary, DetectionSummary::default());
        assert_eq!(summary.average_fire_confidence, 0.0);
    }

    #[test]
    fn average_covers_fire_only() {
        let summary = DetectionSummary::from_detections(&[
            det(Label::Fire, 0.5),
            det(Label::Smoke, 0.99),
            det(Label::Fire, 0.75),
        ]);
        assert!(summary.fire_detected);
        assert!(summary.smoke_detected);
        assert!((summary.average_fire_confidence - 62.5).abs() < 1e-4);
    }

    #[test]
    fn smoke_only_has_no_fire_confidence() {
        let summary = DetectionSummary::from_detections(&[det(Label::Smoke, 0.9)]);
        assert!(!summary.fire_detected);
        assert!(summary.smoke_detected);
        assert_eq!(summary.average_fire_confidence, 0.0);
    }
}
