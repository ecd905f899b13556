pub mod classes;
pub mod config;
pub mod debug_dump;
pub mod encoding;
pub mod errors;
pub mod mask;
pub mod model;
pub mod preprocess;
pub mod server;
pub mod traits;

pub mod mocks;

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use classes::ClassTable;
pub use config::Config;
pub use debug_dump::DebugDump;
pub use errors::{LandCoverError, Result};
pub use mask::PredictionMask;
pub use model::Model;
pub use traits::*;

#[cfg(test)]
pub use mocks::*;

/// Result of one prediction, ready to serialize.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Prediction {
    /// Label for every class index present in the mask.
    pub classes: BTreeMap<u32, String>,
    /// Base64 PNG of the colored mask.
    pub mask_image: String,
    /// Base64 PNG of the resized upload.
    pub input_image: String,
}

/// Turns uploaded bytes into a [`Prediction`].
///
/// Holds the model and the lookup tables for the lifetime of the process.
/// Every method takes `&self`, so one instance serves all requests.
pub struct ImageProcessor<M: ImageSegmentationModel> {
    model: M,
    class_table: ClassTable,
    debug_dump: Option<DebugDump>,
}

impl<M: ImageSegmentationModel> ImageProcessor<M> {
    pub const fn new(model: M, class_table: ClassTable) -> Self {
        Self {
            model,
            class_table,
            debug_dump: None,
        }
    }

    pub fn with_debug_dump(mut self, debug_dump: DebugDump) -> Self {
        self.debug_dump = Some(debug_dump);
        self
    }

    pub const fn class_table(&self) -> &ClassTable {
        &self.class_table
    }

    /// Runs the whole pipeline on one uploaded file.
    ///
    /// Only decoding problems come back as `InvalidUpload`; anything that goes
    /// wrong after the image decoded is an internal failure.
    pub fn process_upload(&self, bytes: &[u8]) -> Result<Prediction> {
        let request_id = Uuid::new_v4();
        let image = preprocess::decode_upload(bytes)?;
        info!(
            "Image loaded successfully: {}x{} ({})",
            image.width(),
            image.height(),
            request_id
        );

        let image_size = self.model.image_size();
        let resized = preprocess::resize_to_square(&image, image_size);
        let input_image = encoding::encode_png_base64(&resized)?;

        let mask = self.segment(&resized)?;
        let present = mask.unique_classes();
        debug!("Prediction completed. Classes in mask: {:?}", present);
        let classes = self.class_table.classify(present);

        let colorized = mask.colorize(&self.class_table);
        if !colorized.unmapped.is_empty() {
            warn!(
                "Classes {:?} have no color in the class table and were painted black",
                colorized.unmapped
            );
        }
        let mask_image = encoding::encode_png_base64(&colorized.image)?;
        debug!("Mask converted to base64. Length: {}", mask_image.len());

        if let Some(debug_dump) = &self.debug_dump {
            debug_dump.write(request_id, &resized, &colorized.image);
        }

        Ok(Prediction {
            classes,
            mask_image,
            input_image,
        })
    }

    /// Preprocesses an image already at model resolution, runs the model and
    /// reduces the scores to a class mask of the same size.
    pub fn segment(&self, image: &image::RgbImage) -> Result<PredictionMask> {
        let tensor = preprocess::to_input_tensor(image);
        let logits = self.model.predict(tensor.view())?;

        let (_, channels, height, width) = logits.dim();
        if (width as u32, height as u32) != image.dimensions() {
            return Err(LandCoverError::model(
                "output shape check",
                format!(
                    "model returned {width}x{height} scores for a {}x{} input",
                    image.width(),
                    image.height()
                ),
            ));
        }
        if let Some(expected) = self.model.num_classes() {
            if channels != expected {
                return Err(LandCoverError::model(
                    "output shape check",
                    format!("model declared {expected} classes but returned {channels}"),
                ));
            }
        }

        PredictionMask::from_logits(logits.view())
    }
}

impl ImageProcessor<Model> {
    /// Builds the production processor from the command-line configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let class_table = match &config.class_table {
            Some(path) => ClassTable::from_json_file(path)?,
            None => ClassTable::landcover(),
        };

        let model = Model::new(
            &config.model_path,
            config.device_id,
            config.num_threads,
            config.image_size,
        )?;
        if let Some(num_classes) = model.num_classes() {
            if num_classes != class_table.len() {
                warn!(
                    "Model predicts {} classes but the class table lists {}",
                    num_classes,
                    class_table.len()
                );
            }
        }

        let mut processor = Self::new(model, class_table);
        if let Some(dir) = &config.debug_dir {
            let debug_dump = DebugDump::new(dir)?;
            info!("Writing debug images to {}", debug_dump.dir().display());
            processor = processor.with_debug_dump(debug_dump);
        }
        Ok(processor)
    }
}
