mod backend;
mod backends;
mod labels;
mod registry;
mod result;
mod summary;
mod worker;
pub mod yolo;

pub use backend::DetectorBackend;
pub use backends::ScriptedBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use labels::ClassMap;
pub use registry::{ActiveDetector, BackendFactory, LoadedModel, ModelRegistry};
pub use result::{BoundingBox, Detection, Label, RawDetection};
pub use summary::DetectionSummary;
pub use worker::DetectionWorker;
