//! Vision/sensor confidence fusion.

use serde::Serialize;

pub const VISION_WEIGHT: f64 = 0.7;
pub const SENSOR_WEIGHT: f64 = 0.3;

/// Confidence triple on the 0..=100 scale.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ConfidenceScores {
    pub vision_confidence: f64,
    pub sensor_confidence: f64,
    pub adjusted_confidence: f64,
}

/// Combine vision and sensor confidence (both percentages).
///
/// A missing sensor contributes 0 but keeps its weight, so vision alone tops out
/// at 70. Inputs outside 0..=100 (or NaN) are clamped first.
pub fn fuse(vision: f64, sensor: Option<f64>) -> ConfidenceScores {
    let vision = clamp_percent(vision);
    let sensor = sensor.map(clamp_percent).unwrap_or(0.0);
    ConfidenceScores {
        vision_confidence: vision,
        sensor_confidence: sensor,
        adjusted_confidence: VISION_WEIGHT * vision + SENSOR_WEIGHT * sensor,
    }
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn weights_both_sources() {
        let scores = fuse(90.0, Some(85.0));
        assert!(close(scores.adjusted_confidence, 88.5));
        assert_eq!(scores.sensor_confidence, 85.0);
    }

    #[test]
    fn absent_sensor_counts_as_zero() {
        let scores = fuse(75.0, None);
        assert!(close(scores.adjusted_confidence, 52.5));
        assert_eq!(scores.sensor_confidence, 0.0);
        assert_eq!(fuse(75.0, None), scores);
    }

    #[test]
    fn clamps_out_of_range_inputs() {
        let scores = fuse(140.0, Some(-5.0));
        assert_eq!(scores.vision_confidence, 100.0);
        assert_eq!(scores.sensor_confidence, 0.0);
        assert!(close(scores.adjusted_confidence, 70.0));
        assert_eq!(fuse(f64::NAN, None).adjusted_confidence, 0.0);
    }
}
