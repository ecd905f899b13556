use std::path::Path;

use crate::{
    errors::{LandCoverError, Result},
    traits::ImageSegmentationModel,
};
use ndarray::prelude::*;
use ort::value::TensorRef;
use ort::{
    execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::SessionBuilder, Session},
};
use parking_lot::Mutex;
use tracing::{debug, info};

/// ONNX Runtime session for the exported land-cover UNet.
///
/// Loaded once at startup. `Session::run` needs exclusive access, so the
/// session sits behind a mutex and requests take turns on it.
pub struct Model {
    image_size: u32,
    num_classes: Option<usize>,
    input_name: String,
    output_name: String,
    session: Mutex<Session>,
}

impl Model {
    pub fn new(
        model_path: &Path,
        device_id: i32,
        num_threads: usize,
        image_size: u32,
    ) -> Result<Self> {
        info!("Loading segmentation model from {}", model_path.display());

        let mut session = SessionBuilder::new()
            .map_err(|e| LandCoverError::model("session builder init", e))?
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ])
            .map_err(|e| LandCoverError::model("execution provider setup", e))?
            .with_memory_pattern(true)
            .map_err(|e| LandCoverError::model("memory pattern setup", e))?
            .with_intra_threads(num_threads)
            .map_err(|e| LandCoverError::model("intra-op thread setup", e))?
            .commit_from_file(model_path)
            .map_err(|e| {
                LandCoverError::model(format!("load model file {}", model_path.display()), e)
            })?;

        let input = session.inputs.first().ok_or_else(|| {
            LandCoverError::model("model input lookup", "model declares no inputs")
        })?;
        let input_name = input.name.clone();
        let declared_size = input
            .input_type
            .tensor_shape()
            .and_then(|shape| shape.get(2).copied())
            .filter(|&dim| dim > 0);
        if let Some(declared) = declared_size {
            if declared as u32 != image_size {
                return Err(LandCoverError::configuration(format!(
                    "model expects {declared}x{declared} input but image size is {image_size}"
                )));
            }
        }

        let output = session.outputs.first().ok_or_else(|| {
            LandCoverError::model("model output lookup", "model declares no outputs")
        })?;
        let output_name = output.name.clone();
        let num_classes = output
            .output_type
            .tensor_shape()
            .and_then(|shape| shape.get(1).copied())
            .filter(|&dim| dim > 0)
            .map(|dim| dim as usize);

        debug!(
            "Model loaded - input: {}, output: {}, classes: {:?}",
            input_name, output_name, num_classes
        );

        // warm up
        let data = Array4::<f32>::zeros((1, 3, image_size as usize, image_size as usize));
        session
            .run(ort::inputs![input_name.as_str() => TensorRef::from_array_view(&data)
                .map_err(|e| LandCoverError::model("warm-up tensor creation", e))?])
            .map_err(|e| LandCoverError::model("warm-up run", e))?;

        info!("Model loaded successfully");

        Ok(Self {
            image_size,
            num_classes,
            input_name,
            output_name,
            session: Mutex::new(session),
        })
    }
}

impl ImageSegmentationModel for Model {
    fn image_size(&self) -> u32 {
        self.image_size
    }

    fn num_classes(&self) -> Option<usize> {
        self.num_classes
    }

    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        let mut binding = self.session.lock();
        let outputs = binding.run(ort::inputs![
            self.input_name.as_str() => TensorRef::from_array_view(&tensor.as_standard_layout())?
        ])?;
        Ok(outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix4>()?
            .to_owned())
    }
}
