use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetection;
use crate::frame::Frame;

/// Backend that replays a fixed detection list for every frame.
///
/// Used by the daemon's demo model and by tests; it never inspects pixels.
#[derive(Clone, Debug, Default)]
pub struct ScriptedBackend {
    detections: Vec<RawDetection>,
    calls: u64,
}

impl ScriptedBackend {
    pub fn new(detections: Vec<RawDetection>) -> Self {
        Self {
            detections,
            calls: 0,
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<RawDetection>> {
        self.calls += 1;
        Ok(self.detections.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;

    #[test]
    fn replays_detections() -> Result<()> {
        let det = RawDetection {
            bbox: BoundingBox::new(1.0, 2.0, 3.0, 4.0),
            class_id: 0,
            confidence: 0.8,
        };
        let mut backend = ScriptedBackend::new(vec![det.clone()]);
        let frame = Frame::solid(8, 8, [0, 0, 0]);
        assert_eq!(backend.detect(&frame)?, vec![det.clone()]);
        assert_eq!(backend.detect(&frame)?, vec![det]);
        assert_eq!(backend.calls(), 2);
        Ok(())
    }
}
