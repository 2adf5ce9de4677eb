#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetection;
use crate::detect::yolo;
use crate::frame::{self, Frame};

/// Tract-based backend for YOLO-style ONNX fire/smoke models.
///
/// Frames are resized to the model input size; boxes are mapped back to frame
/// coordinates before they leave the backend.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    width: u32,
    height: u32,
    confidence_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            confidence_threshold: 0.25,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let resized = frame::normalize(frame.clone(), self.width, self.height)?;
        let pixels = resized.pixels();
        let width = self.width as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            },
        );
        Ok(input.into_tensor())
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(anyhow!("unexpected model output shape {:?}", shape));
        }
        let values: Vec<f32> = view.iter().copied().collect();
        yolo::decode_output(
            &values,
            shape[1],
            shape[2],
            self.confidence_threshold,
            frame.width as f32 / self.width as f32,
            frame.height as f32 / self.height as f32,
        )
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::solid(self.width, self.height, [0, 0, 0]);
        self.detect(&blank).map(|_| ())
    }
}
