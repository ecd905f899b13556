use crate::errors::Result;
use ndarray::prelude::*;

/// Abstraction over the segmentation network.
pub trait ImageSegmentationModel: Send + Sync {
    /// Square input side length
    fn image_size(&self) -> u32;

    /// Output class count, if static
    fn num_classes(&self) -> Option<usize>;

    /// `[N, 3, H, W]` input to raw `[N, C, H, W]` scores
    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>>;
}
