use anyhow::Result;

use crate::detect::result::RawDetection;
use crate::frame::Frame;

/// Detector backend trait.
///
/// Backends report raw class ids; turning them into fire/smoke labels is the
/// job of the model's `ClassMap`, so one backend implementation can serve models
/// with different label layouts.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a normalized frame. Boxes are in frame pixel coordinates.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook, called once after loading.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
