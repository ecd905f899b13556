use crate::errors::{LandCoverError, Result};
use crate::preprocess::{IMAGENET_MEAN, IMAGENET_STD};
use crate::traits::ImageSegmentationModel;
use ndarray::prelude::*;

/// Mock model for tests. Class follows the red channel.
#[derive(Debug, Clone)]
pub struct MockSegmentationModel {
    pub image_size: u32,
    pub num_classes: usize,
    pub fail: bool,
}

impl MockSegmentationModel {
    pub const fn new(image_size: u32) -> Self {
        Self {
            image_size,
            num_classes: 5,
            fail: false,
        }
    }

    pub const fn with_num_classes(mut self, num_classes: usize) -> Self {
        self.num_classes = num_classes;
        self
    }

    /// `predict` always fails
    pub const fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// `red * num_classes / 256`
    pub fn expected_class(&self, red: u8) -> u32 {
        (red as usize * self.num_classes / 256) as u32
    }
}

impl ImageSegmentationModel for MockSegmentationModel {
    fn image_size(&self) -> u32 {
        self.image_size
    }

    fn num_classes(&self) -> Option<usize> {
        Some(self.num_classes)
    }

    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        if self.fail {
            return Err(LandCoverError::model("mock inference", "forced failure"));
        }

        let (batch, _, height, width) = tensor.dim();
        let mut logits = Array4::<f32>::zeros((batch, self.num_classes, height, width));
        for n in 0..batch {
            for y in 0..height {
                for x in 0..width {
                    let red = tensor[[n, 0, y, x]] * IMAGENET_STD[0] + IMAGENET_MEAN[0];
                    let red = (red * 255.0).round().clamp(0.0, 255.0) as u8;
                    let class = self.expected_class(red) as usize;
                    logits[[n, class, y, x]] = 1.0;
                }
            }
        }
        Ok(logits)
    }
}

/// Mock shaped like the land-cover model.
pub const fn create_mock_model() -> MockSegmentationModel {
    MockSegmentationModel::new(512)
}
