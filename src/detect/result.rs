use serde::{Deserialize, Serialize};

/// Box in frame pixel coordinates (top-left / bottom-right corners).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Scale both axes, e.g. from model input space back to frame space.
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self::new(self.x1 * sx, self.y1 * sy, self.x2 * sx, self.y2 * sy)
    }
}

/// Backend output before the model's class map is applied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub bbox: BoundingBox,
    pub class_id: u32,
    pub confidence: f32,
}

/// Labels the pipeline understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Fire,
    Smoke,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Fire => "fire",
            Label::Smoke => "smoke",
        }
    }
}

impl std::str::FromStr for Label {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fire" => Ok(Label::Fire),
            "smoke" => Ok(Label::Smoke),
            other => Err(anyhow::anyhow!("unknown label '{}'", other)),
        }
    }
}

/// Labeled detection with confidence in [0, 1].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub label: Label,
    pub confidence: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_normalizes_corners() {
        let b = BoundingBox::new(10.0, 20.0, 5.0, 2.0);
        assert_eq!((b.x1, b.y1, b.x2, b.y2), (5.0, 2.0, 10.0, 20.0));
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let b = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!((b.iou(&b) - 1.0).abs() < 1e-6);
        let far = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(b.iou(&far), 0.0);
    }

    #[test]
    fn label_parses_case_insensitively() {
        assert_eq!("Fire".parse::<Label>().unwrap(), Label::Fire);
        assert_eq!(" smoke ".parse::<Label>().unwrap(), Label::Smoke);
        assert!("person".parse::<Label>().is_err());
    }
}
